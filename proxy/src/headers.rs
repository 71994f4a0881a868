//! Buffer-level helpers for the response marker header and the small
//! amount of header introspection the plain-HTTP and MITM handlers need.
//!
//! These operate on raw byte buffers rather than a parsed header map,
//! matching the design's own description of in-place buffer rewrites
//! (memmove-style excision and insertion with explicit capacity checks).

const MARKER: &[u8] = b"X-Proxy:CS112\r\n";

/// Insert `X-Proxy:CS112` immediately after the status line. A no-op if
/// the marker is already present, if there is no status-line terminator
/// yet, or if inserting would grow the buffer past `cap`.
pub fn inject_header(buf: &mut Vec<u8>, cap: usize) -> bool {
	if contains(buf, b"X-Proxy:") {
		return false;
	}
	let Some(status_line_end) = find(buf, b"\r\n").map(|p| p + 2) else {
		return false;
	};
	if buf.len() + MARKER.len() > cap {
		return false;
	}
	buf.splice(status_line_end..status_line_end, MARKER.iter().copied());
	true
}

/// Remove the first `Accept-Encoding:` header line, if any, shifting the
/// remainder of the buffer left over the gap. Operates on the whole
/// buffer; callers only call this on request heads, where a body (if any)
/// doesn't contain header-shaped lines that would false-positive.
pub fn excise_accept_encoding(buf: &mut Vec<u8>) -> bool {
	let Some(start) = find_header_line(buf, b"accept-encoding:") else {
		return false;
	};
	let end = find(&buf[start..], b"\r\n").map(|p| start + p + 2).unwrap_or(buf.len());
	buf.drain(start..end);
	true
}

/// Case-insensitive substring search for `Content-Type:`, returning the
/// trimmed value up to the next CR or LF. Does not handle a value split
/// across continuation lines -- modern servers don't emit that, but it is
/// a latent assumption carried over from the original design.
pub fn extract_content_type(headers: &[u8]) -> Option<String> {
	header_value(headers, b"content-type:")
}

/// Generic case-insensitive header value lookup, used for `Host:` as well
/// as `Content-Type:`. Stops at the next CR or LF; no continuation-line
/// support.
pub fn header_value(headers: &[u8], name_lower: &[u8]) -> Option<String> {
	let start = find_header_line(headers, name_lower)? + name_lower.len();
	let rest = &headers[start..];
	let value_end = rest
		.iter()
		.position(|&b| b == b'\r' || b == b'\n')
		.unwrap_or(rest.len());
	let value = &rest[..value_end];
	let trimmed = trim_leading_spaces(value);
	Some(String::from_utf8_lossy(trimmed).into_owned())
}

pub fn is_html_content_type(content_type: &str) -> bool {
	contains(content_type.as_bytes(), b"text/html")
}

pub fn has_content_encoding(headers: &[u8]) -> bool {
	find_header_line(headers, b"content-encoding:").is_some()
}

/// Parse `Content-Length`, if present and well-formed. Used as a
/// termination hint for buffered response collection; chunked
/// transfer-encoding is not understood (see module docs on `plain_http`
/// and `mitm`).
pub fn content_length(headers: &[u8]) -> Option<usize> {
	header_value(headers, b"content-length:")?.trim().parse().ok()
}

/// Locate the blank line separating headers from body, returning the
/// index of its leading `\r`. The body starts at the returned index + 4.
pub fn header_block_end(buf: &[u8]) -> Option<usize> {
	buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// The first line of a response or request buffer, without its trailing
/// `\r\n`.
pub fn first_line(buf: &[u8]) -> &[u8] {
	match find(buf, b"\r\n") {
		Some(pos) => &buf[..pos],
		None => buf,
	}
}

fn trim_leading_spaces(mut value: &[u8]) -> &[u8] {
	while value.first() == Some(&b' ') {
		value = &value[1..];
	}
	value
}

/// Find `needle` as a header field name at the start of a line (preceded
/// by the start of the buffer or a `\n`), case-insensitively.
fn find_header_line(haystack: &[u8], needle_lower: &[u8]) -> Option<usize> {
	let lower = haystack.to_ascii_lowercase();
	let mut search_from = 0;
	while let Some(rel) = find(&lower[search_from..], needle_lower) {
		let pos = search_from + rel;
		if pos == 0 || haystack[pos - 1] == b'\n' {
			return Some(pos);
		}
		search_from = pos + 1;
	}
	None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
	find(&haystack.to_ascii_lowercase(), &needle.to_ascii_lowercase()).is_some()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn injects_marker_after_status_line() {
		let mut buf = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec();
		assert!(inject_header(&mut buf, 4096));
		assert_eq!(
			buf,
			b"HTTP/1.1 200 OK\r\nX-Proxy:CS112\r\nContent-Length: 5\r\n\r\nhello".to_vec()
		);
	}

	#[test]
	fn injecting_twice_is_a_no_op() {
		let mut buf = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
		assert!(inject_header(&mut buf, 4096));
		let after_first = buf.clone();
		assert!(!inject_header(&mut buf, 4096));
		assert_eq!(buf, after_first);
	}

	#[test]
	fn refuses_to_overflow_cap() {
		let mut buf = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
		let cap = buf.len(); // no room for the marker
		assert!(!inject_header(&mut buf, cap));
		assert_eq!(buf, b"HTTP/1.1 200 OK\r\n\r\n".to_vec());
	}

	#[test]
	fn excises_accept_encoding_case_insensitively() {
		let mut buf = b"GET / HTTP/1.1\r\nHost: x\r\nAccept-Encoding: gzip\r\n\r\n".to_vec();
		assert!(excise_accept_encoding(&mut buf));
		assert_eq!(buf, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec());
	}

	#[test]
	fn extracts_and_classifies_content_type() {
		let headers = b"HTTP/1.1 200 OK\r\nContent-Type:  text/html; charset=utf-8\r\n\r\n";
		let ct = extract_content_type(headers).unwrap();
		assert_eq!(ct, "text/html; charset=utf-8");
		assert!(is_html_content_type(&ct));
		assert!(!is_html_content_type("application/json"));
	}

	#[test]
	fn detects_content_encoding_presence() {
		assert!(has_content_encoding(b"Content-Encoding: gzip\r\n\r\n"));
		assert!(!has_content_encoding(b"Content-Type: text/html\r\n\r\n"));
	}

	#[test]
	fn parses_content_length() {
		assert_eq!(content_length(b"Content-Length: 42\r\n\r\n"), Some(42));
		assert_eq!(content_length(b"Content-Type: text/html\r\n\r\n"), None);
		assert_eq!(content_length(b"Content-Length: nope\r\n\r\n"), None);
	}

	#[test]
	fn finds_header_block_end() {
		let buf = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi";
		let end = header_block_end(buf).unwrap();
		assert_eq!(&buf[end + 4..], b"hi");
	}

	#[test]
	fn extracts_first_line() {
		assert_eq!(first_line(b"HTTP/1.1 200 OK\r\nX: y\r\n\r\n"), b"HTTP/1.1 200 OK");
	}
}
