//! Serial line protocol: request decoding, response encoding, constants.
//!
//! Pure functions with no I/O — reusable with any transport.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};

use crate::types::*;
use crate::QbitLinkError;

// --- Actions ---
pub const ACTION_START_JOB: &str = "start_job";
pub const ACTION_START_REAL_IBM_JOB: &str = "start_real_ibm_job";
pub const ACTION_CONFIGURE_IBM: &str = "configure_ibm";
pub const ACTION_GET_JOB_STATUS: &str = "get_job_status";
pub const ACTION_GET_JOB_RESULT: &str = "get_job_result";

// --- Fixed replies ---
pub const TOKEN_CONFIGURED: &str = "IBM token configured";
pub const HARDWARE_DISABLED: &str = "hardware mode disabled";

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_NUM_QUBITS: u32 = 1;
pub const LINE_TERMINATOR: u8 = b'\n';
/// Longest unterminated input buffered before it is flushed as one line.
pub const MAX_LINE_LEN: usize = 4096;

/// Decode one request line.
///
/// Syntax errors map to [`QbitLinkError::MalformedJson`]. Only `action` and
/// the fields the matched action uses are inspected; anything else in the
/// object is ignored. A non-string `action` is treated as unknown.
pub fn parse_command(line: &str) -> Result<Command, QbitLinkError> {
    let value: serde_json::Value =
        serde_json::from_str(line.trim()).map_err(|_| QbitLinkError::MalformedJson)?;

    let object = value
        .as_object()
        .ok_or_else(|| QbitLinkError::Protocol("Request must be a JSON object".into()))?;

    let action = match object.get("action") {
        Some(Value::String(action)) => action.as_str(),
        Some(other) => return Ok(Command::Unknown(other.to_string())),
        None => return Err(QbitLinkError::Protocol("Missing field: action".into())),
    };

    let command = match action {
        ACTION_START_JOB => Command::StartJob {
            num_qubits: optional_num_qubits(object)?,
        },
        ACTION_START_REAL_IBM_JOB => Command::StartHardwareJob {
            num_qubits: optional_num_qubits(object)?,
        },
        ACTION_CONFIGURE_IBM => Command::ConfigureIbm {
            token: required_string(object, "token")?,
        },
        ACTION_GET_JOB_STATUS => Command::GetJobStatus {
            job_id: require_job_id(object)?,
        },
        ACTION_GET_JOB_RESULT => Command::GetJobResult {
            job_id: require_job_id(object)?,
        },
        other => Command::Unknown(other.to_string()),
    };
    Ok(command)
}

fn optional_num_qubits(object: &Map<String, Value>) -> Result<u32, QbitLinkError> {
    match object.get("num_qubits") {
        None | Some(Value::Null) => Ok(DEFAULT_NUM_QUBITS),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                QbitLinkError::Protocol(format!("num_qubits must be a non-negative integer, got {v}"))
            }),
    }
}

fn required_string(object: &Map<String, Value>, field: &str) -> Result<String, QbitLinkError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(QbitLinkError::Protocol(format!(
            "{field} must be a string, got {other}"
        ))),
        None => Err(QbitLinkError::Protocol(format!("Missing field: {field}"))),
    }
}

fn require_job_id(object: &Map<String, Value>) -> Result<String, QbitLinkError> {
    let id = required_string(object, "job_id")?;
    if id.trim().is_empty() {
        return Err(QbitLinkError::Protocol("Empty job_id".into()));
    }
    Ok(id)
}

/// Check a requested qubit count against the configured ceiling.
pub fn validate_num_qubits(n: u32, max: u32) -> Result<u32, QbitLinkError> {
    if n == 0 {
        return Err(QbitLinkError::Protocol("num_qubits must be positive".into()));
    }
    if n > max {
        return Err(QbitLinkError::Protocol(format!(
            "num_qubits {n} exceeds maximum of {max}"
        )));
    }
    Ok(n)
}

/// JSON formatter emitting `", "` and `": "` separators.
///
/// The microcontroller helper searches responses for literal substrings such
/// as `"job_id": "`, so the spacing is part of the wire format.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Encode a value as spaced JSON without a terminator.
pub fn to_spaced_json<T: Serialize>(value: &T) -> Result<String, QbitLinkError> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, SpacedFormatter);
    value
        .serialize(&mut ser)
        .map_err(|e| QbitLinkError::Protocol(format!("Encode failed: {e}")))?;
    String::from_utf8(buf).map_err(|e| QbitLinkError::Protocol(format!("Encode failed: {e}")))
}

/// Build a response frame: spaced JSON + newline.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, QbitLinkError> {
    let mut frame = to_spaced_json(response)?.into_bytes();
    frame.push(LINE_TERMINATOR);
    Ok(frame)
}

/// Split the first complete line off `buf`, stripping `\r\n` / `\n`.
///
/// Invalid UTF-8 is replaced rather than rejected; the JSON parser then
/// reports the line as malformed.
pub fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf.iter().position(|&b| b == LINE_TERMINATOR)?;
    let line: Vec<u8> = buf.drain(..=pos).collect();
    let text = String::from_utf8_lossy(&line[..pos]);
    Some(text.trim().to_string())
}

/// [`take_line`], but once `buf` holds `max` bytes with no terminator the
/// whole buffer is returned as one line, which then fails to parse.
pub fn take_line_capped(buf: &mut Vec<u8>, max: usize) -> Option<String> {
    if let Some(line) = take_line(buf) {
        return Some(line);
    }
    if buf.len() < max {
        return None;
    }
    let line = String::from_utf8_lossy(buf).trim().to_string();
    buf.clear();
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Request parsing --

    #[test]
    fn parse_start_job_with_qubits() {
        let cmd = parse_command(r#"{"action": "start_job", "num_qubits": 2}"#).unwrap();
        assert_eq!(cmd, Command::StartJob { num_qubits: 2 });
    }

    #[test]
    fn parse_start_job_defaults_to_one_qubit() {
        let cmd = parse_command(r#"{"action": "start_job"}"#).unwrap();
        assert_eq!(cmd, Command::StartJob { num_qubits: 1 });
    }

    #[test]
    fn parse_start_real_ibm_job() {
        let cmd = parse_command(r#"{"action": "start_real_ibm_job", "num_qubits": 3}"#).unwrap();
        assert_eq!(cmd, Command::StartHardwareJob { num_qubits: 3 });
    }

    #[test]
    fn parse_configure_ibm() {
        let cmd = parse_command(r#"{"action": "configure_ibm", "token": "abc"}"#).unwrap();
        assert_eq!(cmd, Command::ConfigureIbm { token: "abc".into() });
    }

    #[test]
    fn parse_job_queries() {
        let cmd = parse_command(r#"{"action": "get_job_status", "job_id": "j1"}"#).unwrap();
        assert_eq!(cmd, Command::GetJobStatus { job_id: "j1".into() });
        let cmd = parse_command(r#"{"action": "get_job_result", "job_id": "j1"}"#).unwrap();
        assert_eq!(cmd, Command::GetJobResult { job_id: "j1".into() });
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        let cmd = parse_command("  {\"action\": \"start_job\"}\r\n").unwrap();
        assert_eq!(cmd, Command::StartJob { num_qubits: 1 });
    }

    #[test]
    fn parse_unknown_action() {
        let cmd = parse_command(r#"{"action": "ping"}"#).unwrap();
        assert_eq!(cmd, Command::Unknown("ping".into()));
    }

    #[test]
    fn parse_unknown_action_ignores_other_fields() {
        let cmd = parse_command(r#"{"action": "ping", "num_qubits": "x"}"#).unwrap();
        assert_eq!(cmd, Command::Unknown("ping".into()));
    }

    #[test]
    fn parse_non_string_action_is_unknown() {
        let cmd = parse_command(r#"{"action": 5}"#).unwrap();
        assert_eq!(cmd, Command::Unknown("5".into()));
    }

    #[test]
    fn parse_ignores_fields_the_action_does_not_use() {
        let cmd =
            parse_command(r#"{"action": "configure_ibm", "token": "abc", "job_id": 7}"#).unwrap();
        assert_eq!(cmd, Command::ConfigureIbm { token: "abc".into() });
        let cmd = parse_command(r#"{"action": "start_job", "token": 1, "job_id": null}"#).unwrap();
        assert_eq!(cmd, Command::StartJob { num_qubits: 1 });
    }

    #[test]
    fn parse_not_json_is_malformed() {
        assert!(matches!(parse_command("not json"), Err(QbitLinkError::MalformedJson)));
        assert!(matches!(parse_command(""), Err(QbitLinkError::MalformedJson)));
        assert!(matches!(parse_command("{\"action\":"), Err(QbitLinkError::MalformedJson)));
    }

    #[test]
    fn parse_non_object_is_invalid() {
        assert!(matches!(parse_command("42"), Err(QbitLinkError::Protocol(_))));
        assert!(matches!(parse_command("[1, 2]"), Err(QbitLinkError::Protocol(_))));
    }

    #[test]
    fn parse_missing_fields() {
        assert!(matches!(parse_command("{}"), Err(QbitLinkError::Protocol(_))));
        assert!(matches!(
            parse_command(r#"{"action": "configure_ibm"}"#),
            Err(QbitLinkError::Protocol(_))
        ));
        assert!(matches!(
            parse_command(r#"{"action": "get_job_status"}"#),
            Err(QbitLinkError::Protocol(_))
        ));
        assert!(matches!(
            parse_command(r#"{"action": "get_job_result", "job_id": " "}"#),
            Err(QbitLinkError::Protocol(_))
        ));
    }

    #[test]
    fn parse_wrong_field_type() {
        assert!(matches!(
            parse_command(r#"{"action": "start_job", "num_qubits": -1}"#),
            Err(QbitLinkError::Protocol(_))
        ));
        assert!(matches!(
            parse_command(r#"{"action": "start_job", "num_qubits": "two"}"#),
            Err(QbitLinkError::Protocol(_))
        ));
        assert!(matches!(
            parse_command(r#"{"action": "start_job", "num_qubits": 1.5}"#),
            Err(QbitLinkError::Protocol(_))
        ));
        assert!(matches!(
            parse_command(r#"{"action": "get_job_status", "job_id": 7}"#),
            Err(QbitLinkError::Protocol(_))
        ));
    }

    #[test]
    fn validate_num_qubits_bounds() {
        assert_eq!(validate_num_qubits(1, 32).unwrap(), 1);
        assert_eq!(validate_num_qubits(32, 32).unwrap(), 32);
        assert!(validate_num_qubits(0, 32).is_err());
        assert!(validate_num_qubits(33, 32).is_err());
    }

    // -- Response encoding --

    #[test]
    fn encode_job_result_spaced() {
        let bits = Bits::new(vec![0, 1]).unwrap();
        let frame = encode_response(&Response::JobResult(bits)).unwrap();
        assert_eq!(frame, b"{\"job_result\": [0, 1]}\n");
    }

    #[test]
    fn encode_status_matches_helper_substring() {
        let frame = encode_response(&Response::Status(TOKEN_CONFIGURED.into())).unwrap();
        let text = String::from_utf8(frame).unwrap();
        assert_eq!(text, "{\"status\": \"IBM token configured\"}\n");
    }

    #[test]
    fn encode_job_id_and_status() {
        let frame = encode_response(&Response::JobId("abc123".into())).unwrap();
        assert_eq!(frame, b"{\"job_id\": \"abc123\"}\n");
        let frame = encode_response(&Response::JobStatus("QUEUED".into())).unwrap();
        assert_eq!(frame, b"{\"job_status\": \"QUEUED\"}\n");
    }

    #[test]
    fn encode_error_escapes_quotes() {
        let frame = encode_response(&Response::Error("bad \"x\"".into())).unwrap();
        assert_eq!(frame, b"{\"error\": \"bad \\\"x\\\"\"}\n");
    }

    #[test]
    fn encode_malformed_error_message() {
        let resp = Response::from(&QbitLinkError::MalformedJson);
        let frame = encode_response(&resp).unwrap();
        assert_eq!(frame, b"{\"error\": \"Invalid JSON format\"}\n");
    }

    // -- Line splitting --

    #[test]
    fn take_line_splits_on_newline() {
        let mut buf = b"first\r\nsecond\npartial".to_vec();
        assert_eq!(take_line(&mut buf).as_deref(), Some("first"));
        assert_eq!(take_line(&mut buf).as_deref(), Some("second"));
        assert_eq!(take_line(&mut buf), None);
        assert_eq!(buf, b"partial");
    }

    #[test]
    fn take_line_capped_flushes_oversized_buffer() {
        let mut buf = vec![b'x'; 10];
        assert_eq!(take_line_capped(&mut buf, 16), None);
        assert_eq!(buf.len(), 10);

        buf.extend_from_slice(&[b'y'; 6]);
        assert_eq!(take_line_capped(&mut buf, 16).map(|l| l.len()), Some(16));
        assert!(buf.is_empty());

        // A terminated line inside the cap still comes out whole.
        let mut buf = b"ok\nzzzzzzzzzz".to_vec();
        assert_eq!(take_line_capped(&mut buf, 4).as_deref(), Some("ok"));
        assert_eq!(take_line_capped(&mut buf, 4).as_deref(), Some("zzzzzzzzzz"));
    }

    #[test]
    fn oversized_line_parses_as_malformed() {
        let mut buf = vec![b'{'; MAX_LINE_LEN];
        let line = take_line_capped(&mut buf, MAX_LINE_LEN).unwrap();
        assert!(matches!(parse_command(&line), Err(QbitLinkError::MalformedJson)));
    }

    #[test]
    fn take_line_replaces_invalid_utf8() {
        let mut buf = vec![0xFF, b'{', b'\n'];
        let line = take_line(&mut buf).unwrap();
        assert!(line.ends_with('{'));
        assert!(buf.is_empty());
    }
}
