//! Frame encoding and the pull-based response decoder.

/// First byte of every frame (STX)
pub const STX: u8 = 0x02;

/// Binary monitor API version, second byte of every frame
pub const API_VERSION: u8 = 0x02;

/// Size of a request header: marker, length, request id, command
pub const REQUEST_HEADER_SIZE: usize = 11;

/// Size of a response header: marker, length, command, error, request id
pub const RESPONSE_HEADER_SIZE: usize = 12;

/// Error code carried by successful responses
pub const ERROR_OK: u8 = 0x00;

/// Command type constants
pub mod command {
    pub const MEMORY_GET: u8 = 0x01;
    pub const MEMORY_SET: u8 = 0x02;
    pub const KEYBOARD_FEED: u8 = 0x72;
    pub const INFO: u8 = 0x85;
    pub const RESET: u8 = 0xCC;
}

/// A response frame borrowed from a received byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub command: u8,
    pub error_code: u8,
    pub request_id: u32,
    pub body: &'a [u8],
}

impl<'a> Frame<'a> {
    /// True when the monitor reported success for this frame
    pub fn is_ok(&self) -> bool {
        self.error_code == ERROR_OK
    }

    /// Length of the frame on the wire, header included
    pub fn wire_len(&self) -> usize {
        RESPONSE_HEADER_SIZE + self.body.len()
    }
}

/// Encode a request frame.
///
/// Format: `[STX][API][body_len:u32-LE][request_id:u32-LE][command:u8][body...]`
pub fn encode(command: u8, request_id: u32, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(REQUEST_HEADER_SIZE + body.len());
    frame.push(STX);
    frame.push(API_VERSION);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&request_id.to_le_bytes());
    frame.push(command);
    frame.extend_from_slice(body);
    frame
}

/// Encode a response frame the way the emulator sends it.
///
/// Format: `[STX][API][body_len:u32-LE][command:u8][error:u8][request_id:u32-LE][body...]`
pub fn encode_response(command: u8, error_code: u8, request_id: u32, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(RESPONSE_HEADER_SIZE + body.len());
    frame.push(STX);
    frame.push(API_VERSION);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.push(command);
    frame.push(error_code);
    frame.extend_from_slice(&request_id.to_le_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Result of one decoder step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// A complete frame; the decoder has moved past it
    Frame(Frame<'a>),
    /// A frame starts at `offset` but the buffer ends before it does.
    /// The decoder stays at `offset` so a longer buffer can resume there.
    Truncated { offset: usize },
    /// No further frame start in the buffer
    End,
}

/// Pull-based scanner over a received byte stream.
///
/// Bytes that do not start a frame are skipped one at a time. Complete
/// frames are consumed whole whatever their command, so unrelated event
/// frames cannot desynchronize the scan.
#[derive(Debug, Clone)]
pub struct FrameDecoder<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> FrameDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    /// Start scanning `buf` from `offset`, e.g. the offset of a frame that
    /// was reported as truncated in a shorter copy of the stream.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        FrameDecoder { buf, offset }
    }

    /// Current scan position
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Decode the next frame, or report truncation or end of buffer
    pub fn next_frame(&mut self) -> Decoded<'a> {
        loop {
            let rest = self.buf.get(self.offset..).unwrap_or(&[]);
            if rest.is_empty() {
                return Decoded::End;
            }
            if !starts_with_marker(rest) {
                self.offset += 1;
                continue;
            }
            if rest.len() < RESPONSE_HEADER_SIZE {
                return Decoded::Truncated {
                    offset: self.offset,
                };
            }

            let body_len = u32::from_le_bytes([rest[2], rest[3], rest[4], rest[5]]);
            let total_len = usize::try_from(body_len)
                .ok()
                .and_then(|len| len.checked_add(RESPONSE_HEADER_SIZE));
            let total_len = match total_len {
                Some(len) if len <= rest.len() => len,
                _ => {
                    return Decoded::Truncated {
                        offset: self.offset,
                    }
                }
            };

            let frame = Frame {
                command: rest[6],
                error_code: rest[7],
                request_id: u32::from_le_bytes([rest[8], rest[9], rest[10], rest[11]]),
                body: &rest[RESPONSE_HEADER_SIZE..total_len],
            };
            self.offset += total_len;
            return Decoded::Frame(frame);
        }
    }
}

impl<'a> Iterator for FrameDecoder<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Frame<'a>> {
        match self.next_frame() {
            Decoded::Frame(frame) => Some(frame),
            Decoded::Truncated { .. } | Decoded::End => None,
        }
    }
}

/// Iterate over every complete frame in `buf`
pub fn decode_all(buf: &[u8]) -> FrameDecoder<'_> {
    FrameDecoder::new(buf)
}

/// A lone STX at the very end still counts as a possible frame start
fn starts_with_marker(data: &[u8]) -> bool {
    match data {
        [STX] => true,
        [STX, API_VERSION, ..] => true,
        _ => false,
    }
}
