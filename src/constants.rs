/// Number of comma-separated fields in one telemetry line.
pub const FIELD_COUNT: usize = 5;

pub const FIELD_DELIMITER: u8 = b',';
pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest accepted request line in bytes, terminator included.
pub const MAX_LINE_LEN: usize = 4096;

pub const OK_RESPONSE: &[u8] = b"OK\n";
pub const ERROR_PREFIX: &[u8] = b"ERROR: ";

const _: () = assert!(
    MAX_LINE_LEN > FIELD_COUNT,
    "a line must be able to hold every delimiter"
);
