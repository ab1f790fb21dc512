//! The line-delimited stdio protocol workers speak, isolated from process
//! management so the parsing rules can be unit-tested without spawning
//! anything.

pub const READY_MARKER: &str = "---NANOCLAW_READY---";
pub const OUTPUT_START: &str = "---NANOCLAW_OUTPUT_START---";
pub const OUTPUT_END: &str = "---NANOCLAW_OUTPUT_END---";

/// Extract the JSON payload from a worker's stdout, given the lines seen
/// since the last request was written. Strict marker parsing first; for a
/// cold worker whose output never carried markers, the last non-empty line
/// is accepted instead.
pub fn extract_payload(lines: &[String]) -> Option<String> {
    let start = lines.iter().position(|l| l.trim() == OUTPUT_START);
    let end = lines.iter().position(|l| l.trim() == OUTPUT_END);
    if let (Some(s), Some(e)) = (start, end) {
        if s < e {
            return Some(lines[s + 1..e].join("\n"));
        }
    }
    lines.iter().rev().find(|l| !l.trim().is_empty()).cloned()
}

/// Truncate worker output/error collection at `limit` bytes, returning
/// whether bytes were dropped.
pub fn cap_bytes(buf: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    if buf.len() >= limit {
        return true;
    }
    let remaining = limit - buf.len();
    if chunk.len() <= remaining {
        buf.extend_from_slice(chunk);
        false
    } else {
        buf.extend_from_slice(&chunk[..remaining]);
        true
    }
}

/// The message embedded in a cold-path failure: the last `n` bytes of
/// stderr, lossily decoded.
pub fn tail_str(buf: &[u8], n: usize) -> String {
    let start = buf.len().saturating_sub(n);
    String::from_utf8_lossy(&buf[start..]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_payload_between_markers() {
        let lines = vec![
            "some stray log".to_string(),
            OUTPUT_START.to_string(),
            r#"{"ok":true}"#.to_string(),
            OUTPUT_END.to_string(),
        ];
        assert_eq!(extract_payload(&lines).unwrap(), r#"{"ok":true}"#);
    }

    #[test]
    fn falls_back_to_last_non_empty_line_without_markers() {
        let lines = vec!["noise".to_string(), r#"{"ok":true}"#.to_string(), "".to_string()];
        assert_eq!(extract_payload(&lines).unwrap(), r#"{"ok":true}"#);
    }

    #[test]
    fn cap_bytes_reports_truncation() {
        let mut buf = Vec::new();
        assert!(!cap_bytes(&mut buf, b"hello", 10));
        assert!(cap_bytes(&mut buf, b"world!!!!!", 10));
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn tail_str_keeps_only_the_last_bytes() {
        let buf = b"0123456789abcdef".to_vec();
        assert_eq!(tail_str(&buf, 4), "cdef");
    }
}
