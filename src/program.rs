//! The BASIC test program, in memory and as a `.prg` file.

use std::io::{self, Write};
use std::path::Path;

use tempfile::TempPath;

/// Start of BASIC program text
pub const PROGRAM_BASE: u16 = 0x0801;

/// TXTTAB; VARTAB, ARYTAB and STREND follow as consecutive words
pub const BASIC_POINTERS: u16 = 0x002B;

/// Default text screen
pub const SCREEN_BASE: u16 = 0x0400;
pub const SCREEN_SIZE: usize = 1000;

/// BASIC V2 token for PRINT
const TOKEN_PRINT: u8 = 0x99;

/// Text the program prints and the smoke test looks for
pub const HELLO: &str = "HELLO";

/// Tokenized `<line> PRINT "<text>"` as the only line of a program at
/// [`PROGRAM_BASE`], followed by the end-of-program link.
pub fn print_program(line: u16, text: &str) -> Vec<u8> {
    // link(2) line(2) PRINT(1) quote(1) text quote(1) eol(1)
    let line_len = 4 + 1 + 1 + text.len() + 1 + 1;
    let next_line = PROGRAM_BASE + line_len as u16;

    let mut program = Vec::with_capacity(line_len + 2);
    program.extend_from_slice(&next_line.to_le_bytes());
    program.extend_from_slice(&line.to_le_bytes());
    program.push(TOKEN_PRINT);
    program.push(b'"');
    program.extend_from_slice(text.as_bytes());
    program.push(b'"');
    program.push(0x00);
    program.extend_from_slice(&[0x00, 0x00]);
    program
}

/// `10 PRINT "HELLO"`
pub fn hello_program() -> Vec<u8> {
    print_program(10, HELLO)
}

/// TXTTAB, VARTAB, ARYTAB, STREND for a program of `len` bytes at
/// [`PROGRAM_BASE`]; variables start right after the program.
pub fn basic_pointers(len: usize) -> Vec<u8> {
    let end = PROGRAM_BASE + len as u16;
    let mut blob = Vec::with_capacity(8);
    for pointer in [PROGRAM_BASE, end, end, end] {
        blob.extend_from_slice(&pointer.to_le_bytes());
    }
    blob
}

/// Screen codes for upper-case text in the power-on character set
pub fn screen_codes(text: &str) -> Vec<u8> {
    text.bytes()
        .map(|b| match b {
            0x40..=0x5F => b - 0x40,
            _ => b,
        })
        .collect()
}

/// A `.prg` file (load address header + program) removed on drop
pub struct PrgFile {
    path: TempPath,
}

impl PrgFile {
    pub fn write(program: &[u8]) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("hello_")
            .suffix(".prg")
            .tempfile()?;
        file.write_all(&PROGRAM_BASE.to_le_bytes())?;
        file.write_all(program)?;
        file.flush()?;
        Ok(PrgFile {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
