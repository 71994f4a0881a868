//! Plain-HTTP handler: the request never touches TLS. A request is parsed
//! just enough to find its target, forwarded to the origin verbatim (minus
//! `Accept-Encoding` when enhancement is active), and the response is
//! either streamed straight through with a marker header or buffered and
//! offered to the enhancement backend, per the active mode.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::Mode;
use crate::enhance::EnhanceClient;
use crate::io_util::{IO_TIMEOUT, MAX_RESPONSE, RELAY_CHUNK, read_buffered_response};
use crate::{classify, headers, wire};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle one plain-HTTP request already classified by [`crate::classify`].
/// `request` is the exact bytes read off the client socket, header excision
/// (if any) included by the caller's choice of `mode`.
pub async fn handle(
	mut client: TcpStream,
	mut request: Vec<u8>,
	request_uri: &str,
	mode: Mode,
	enhance: &EnhanceClient,
) {
	let Some(host_header) = headers::header_value(&request, b"host:") else {
		wire::send(&mut client, wire::BAD_REQUEST).await;
		return;
	};
	let (hostname, port) = classify::parse_host_port(&host_header, 80);

	if mode.llm_enabled() {
		headers::excise_accept_encoding(&mut request);
	}

	let Ok(Ok(mut origin)) = timeout(CONNECT_TIMEOUT, TcpStream::connect((hostname.as_str(), port))).await else {
		tracing::debug!(host = %hostname, port, "origin connect failed");
		wire::send(&mut client, wire::BAD_GATEWAY).await;
		return;
	};

	if timeout(IO_TIMEOUT, origin.write_all(&request)).await.is_err() {
		return;
	}

	match mode {
		Mode::FastRelay => relay(&mut origin, &mut client).await,
		Mode::Enhance => {
			let url = format!("http://{hostname}{request_uri}");
			enhance_and_respond(&mut origin, &mut client, enhance, &url).await;
		},
	}
}

/// Stream the response through unchanged, injecting the marker header into
/// the first chunk if it looks like a status line.
async fn relay(origin: &mut TcpStream, client: &mut TcpStream) {
	let mut buf = vec![0u8; RELAY_CHUNK];
	let mut first = true;
	loop {
		let n = match timeout(IO_TIMEOUT, origin.read(&mut buf)).await {
			Ok(Ok(0)) | Err(_) => break,
			Ok(Err(_)) => break,
			Ok(Ok(n)) => n,
		};

		if first {
			first = false;
			if buf[..n].starts_with(b"HTTP/") {
				let mut chunk = buf[..n].to_vec();
				headers::inject_header(&mut chunk, chunk.len() + 32);
				if client.write_all(&chunk).await.is_err() {
					break;
				}
				continue;
			}
		}

		if client.write_all(&buf[..n]).await.is_err() {
			break;
		}
	}
}

/// Buffer the full response, try to enhance it, and write either the
/// reissued response or the original with the marker header injected.
async fn enhance_and_respond(origin: &mut TcpStream, client: &mut TcpStream, enhance: &EnhanceClient, url: &str) {
	let buf = read_buffered_response(origin).await;

	if let Some(head_end) = headers::header_block_end(&buf) {
		let head = &buf[..head_end];
		let body = &buf[head_end + 4..];
		let content_type = headers::extract_content_type(head).unwrap_or_default();
		let is_html = headers::is_html_content_type(&content_type);
		let is_compressed = headers::has_content_encoding(head);

		if is_html && !is_compressed && !body.is_empty() && buf.len() < MAX_RESPONSE {
			if let Some(enhanced) = enhance.enhance(body, url).await {
				let response = reissue(headers::first_line(&buf), &enhanced);
				let _ = client.write_all(&response).await;
				return;
			}
		}
	}

	let mut fallback = buf;
	headers::inject_header(&mut fallback, fallback.len() + 32);
	let _ = client.write_all(&fallback).await;
}

/// Build a fresh response frame: the original status line, a brand-new
/// header block describing the enhanced body, and the body itself.
fn reissue(status_line: &[u8], body: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(status_line.len() + body.len() + 128);
	out.extend_from_slice(status_line);
	out.extend_from_slice(b"\r\n");
	out.extend_from_slice(b"X-Proxy:CS112\r\n");
	out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
	out.extend_from_slice(b"Content-Type: text/html; charset=utf-8\r\n");
	out.extend_from_slice(b"Connection: close\r\n\r\n");
	out.extend_from_slice(body);
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reissue_builds_expected_frame() {
		let response = reissue(b"HTTP/1.1 200 OK", b"<p>A!</p>");
		let text = String::from_utf8(response).unwrap();
		assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
		assert!(text.contains("X-Proxy:CS112\r\n"));
		assert!(text.contains("Content-Length: 9\r\n"));
		assert!(text.contains("Content-Type: text/html; charset=utf-8\r\n"));
		assert!(text.contains("Connection: close\r\n"));
		assert!(text.ends_with("<p>A!</p>"));
	}
}
