//! Raw header block rendering and parsing.
//!
//! The scratch file starts with the response head in wire form
//! (`HTTP/1.1 200 OK\r\nName: value\r\n...\r\n\r\n`), followed by the body.

use crate::types::ResponseHeaders;

/// Render a response head as it would appear on the wire.
pub(crate) fn render_header_block(status: u16, reason: &str, headers: &[(String, String)]) -> String {
    let mut block = if reason.is_empty() {
        format!("HTTP/1.1 {}\r\n", status)
    } else {
        format!("HTTP/1.1 {} {}\r\n", status, reason)
    };
    for (name, value) in headers {
        block.push_str(name);
        block.push_str(": ");
        block.push_str(value);
        block.push_str("\r\n");
    }
    block.push_str("\r\n");
    block
}

/// Parse a raw header block into a name → value map.
///
/// Empty lines and the status line are dropped; each remaining line is split
/// on its first `:` and the value trimmed. Lines without a `:` are ignored and
/// a repeated name keeps its last value.
pub fn parse_header_block(raw: &str) -> ResponseHeaders {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}
