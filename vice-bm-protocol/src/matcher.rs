//! Locating the response to a request inside a received stream.

use crate::frame::{decode_all, Frame};

fn same_request(frame: &Frame<'_>, command: u8, request_id: Option<u32>) -> bool {
    frame.command == command && request_id.map_or(true, |id| frame.request_id == id)
}

/// Find the first successful response frame for `command`.
///
/// With `request_id` set, only frames echoing that id match; `None` accepts
/// any id. Frames carrying a non-zero error code never match, and neither do
/// frames cut off at the end of the stream.
pub fn find(stream: &[u8], command: u8, request_id: Option<u32>) -> Option<Frame<'_>> {
    decode_all(stream).find(|frame| frame.is_ok() && same_request(frame, command, request_id))
}

/// Error code of the first frame that answers the request but reports a
/// failure. Only used to enrich diagnostics when [`find`] comes up empty.
pub fn find_error(stream: &[u8], command: u8, request_id: Option<u32>) -> Option<u8> {
    decode_all(stream)
        .find(|frame| !frame.is_ok() && same_request(frame, command, request_id))
        .map(|frame| frame.error_code)
}
