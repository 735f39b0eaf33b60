use crate::constants::{ERROR_PREFIX, FIELD_COUNT, FIELD_DELIMITER, OK_RESPONSE};
use crate::error::{MalformedRecord, PersistenceError};
use crate::types::Record;

/// One protocol reply. Every request line gets exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error(String),
}

impl From<&MalformedRecord> for Response {
    fn from(err: &MalformedRecord) -> Self {
        Response::Error(err.to_string())
    }
}

impl From<PersistenceError> for Response {
    fn from(err: PersistenceError) -> Self {
        Response::Error(err.cause().to_owned())
    }
}

/// Decode one request line into a record.
///
/// `line` may still carry its `\n` (and a `\r` before it). Whitespace around
/// the line and around each field is dropped; the field values themselves are
/// not inspected.
pub fn decode_line(line: &[u8]) -> Result<Record, MalformedRecord> {
    let text = std::str::from_utf8(line).map_err(|_| MalformedRecord::Encoding)?;
    let text = text.trim();

    let found = text.bytes().filter(|&b| b == FIELD_DELIMITER).count() + 1;
    if found != FIELD_COUNT {
        return Err(MalformedRecord::FieldCount { found });
    }

    let mut fields = text.split(FIELD_DELIMITER as char).map(str::trim);
    match (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) {
        (Some(device_id), Some(latitude), Some(longitude), Some(speed), Some(heading)) => Ok(
            Record::new(device_id, latitude, longitude, speed, heading),
        ),
        _ => Err(MalformedRecord::FieldCount { found }),
    }
}

/// Encode a record as a request line, terminator included.
pub fn encode_record(buf: &mut Vec<u8>, record: &Record) {
    let fields = [
        record.device_id(),
        record.latitude(),
        record.longitude(),
        record.speed(),
        record.heading(),
    ];
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            buf.extend_from_slice(b", ");
        }
        buf.extend_from_slice(field.as_bytes());
    }
    buf.push(b'\n');
}

/// Serialize a response line into the write buffer.
/// Line breaks inside an error message are flattened so the peer always
/// reads exactly one line.
pub fn write_response(buf: &mut Vec<u8>, response: &Response) {
    match response {
        Response::Ok => buf.extend_from_slice(OK_RESPONSE),
        Response::Error(message) => {
            buf.extend_from_slice(ERROR_PREFIX);
            buf.extend(message.bytes().map(|b| match b {
                b'\r' | b'\n' => b' ',
                other => other,
            }));
            buf.push(b'\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_line() {
        let record = decode_line(b"DEVICE1, 10.0000, 20.0000, 50.0, 90.0\n").unwrap();
        assert_eq!(record.device_id(), "DEVICE1");
        assert_eq!(record.latitude(), "10.0000");
        assert_eq!(record.longitude(), "20.0000");
        assert_eq!(record.speed(), "50.0");
        assert_eq!(record.heading(), "90.0");
    }

    #[test]
    fn delimiter_space_is_optional() {
        let record = decode_line(b"dev-9,-45.5,170.25,0,359.9").unwrap();
        assert_eq!(record.device_id(), "dev-9");
        assert_eq!(record.latitude(), "-45.5");
        assert_eq!(record.heading(), "359.9");
    }

    #[test]
    fn crlf_terminator_is_stripped() {
        let record = decode_line(b"A, 1, 2, 3, 4\r\n").unwrap();
        assert_eq!(record.heading(), "4");
    }

    #[test]
    fn values_are_not_range_checked() {
        let record = decode_line(b"X, 999.0, abc, -1, \n").unwrap();
        assert_eq!(record.latitude(), "999.0");
        assert_eq!(record.longitude(), "abc");
        assert_eq!(record.heading(), "");
    }

    #[test]
    fn wrong_field_counts_are_rejected() {
        assert_eq!(
            decode_line(b"DEVICE1, 10.0000\n"),
            Err(MalformedRecord::FieldCount { found: 2 })
        );
        assert_eq!(
            decode_line(b"a, b, c, d, e, f\n"),
            Err(MalformedRecord::FieldCount { found: 6 })
        );
        assert_eq!(
            decode_line(b"\n"),
            Err(MalformedRecord::FieldCount { found: 1 })
        );
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        assert_eq!(
            decode_line(b"\xff\xfe, 1, 2, 3, 4\n"),
            Err(MalformedRecord::Encoding)
        );
    }

    #[test]
    fn encoded_record_decodes_to_same_fields() {
        let record = Record::new("D", "1.5", "-2.5", "30.0", "180.0");
        let mut buf = Vec::new();
        encode_record(&mut buf, &record);
        assert_eq!(buf, b"D, 1.5, -2.5, 30.0, 180.0\n");
        assert_eq!(decode_line(&buf).unwrap(), record);
    }

    #[test]
    fn responses_are_single_lines() {
        let mut buf = Vec::new();
        write_response(&mut buf, &Response::Ok);
        write_response(&mut buf, &Response::Error("bad\nthing\r".into()));
        assert_eq!(buf, b"OK\nERROR: bad thing \n");
    }

    #[test]
    fn malformed_response_names_the_problem() {
        let mut buf = Vec::new();
        let err = MalformedRecord::FieldCount { found: 2 };
        write_response(&mut buf, &Response::from(&err));
        assert_eq!(buf, b"ERROR: invalid data: expected 5 fields, got 2\n");
    }
}
