//! Small I/O helpers shared between the plain-HTTP and MITM handlers:
//! the capped, `Content-Length`-aware buffered-response read used by both
//! enhancing paths.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::headers;

pub const RELAY_CHUNK: usize = 8192;
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_RESPONSE: usize = 2 * 1024 * 1024;

/// Read a response into a buffer capped at [`MAX_RESPONSE`], stopping at a
/// short read, the cap, or once `Content-Length` bytes of body have
/// arrived. Chunked transfer-encoding is not understood; such responses
/// are truncated at the cap or the first short read, as spec'd.
pub async fn read_buffered_response<R: AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
	let mut buf = Vec::with_capacity(RELAY_CHUNK);
	let mut chunk = [0u8; RELAY_CHUNK];
	let mut expected_total: Option<usize> = None;

	loop {
		if buf.len() >= MAX_RESPONSE {
			break;
		}
		let n = match timeout(IO_TIMEOUT, reader.read(&mut chunk)).await {
			Ok(Ok(0)) | Err(_) => break,
			Ok(Err(_)) => break,
			Ok(Ok(n)) => n,
		};
		buf.extend_from_slice(&chunk[..n]);

		if expected_total.is_none() {
			if let Some(head_end) = headers::header_block_end(&buf) {
				if let Some(len) = headers::content_length(&buf[..head_end]) {
					expected_total = Some(head_end + 4 + len);
				}
			}
		}
		if let Some(total) = expected_total {
			if buf.len() >= total {
				break;
			}
		}
	}

	buf.truncate(MAX_RESPONSE.min(buf.len()));
	buf
}

/// Read whatever arrives in a single `recv`, up to `cap` bytes. Mirrors the
/// classifier's accepted limitation of not draining a slow client across
/// multiple reads (see [`crate::classify`]).
pub async fn read_once<R: AsyncRead + Unpin>(reader: &mut R, cap: usize) -> std::io::Result<Vec<u8>> {
	let mut buf = vec![0u8; cap];
	let n = timeout(IO_TIMEOUT, reader.read(&mut buf))
		.await
		.map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))??;
	buf.truncate(n);
	Ok(buf)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[tokio::test]
	async fn stops_at_content_length() {
		let mut src = Cursor::new(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhiEXTRA".to_vec());
		let buf = read_buffered_response(&mut src).await;
		assert_eq!(buf, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi".to_vec());
	}

	#[tokio::test]
	async fn stops_at_eof_without_content_length() {
		let mut src = Cursor::new(b"HTTP/1.1 200 OK\r\n\r\nbody".to_vec());
		let buf = read_buffered_response(&mut src).await;
		assert_eq!(buf, b"HTTP/1.1 200 OK\r\n\r\nbody".to_vec());
	}
}
