//! Canned status-line-only responses the handlers write back to a client
//! that is still in plaintext. Kept as plain byte constants rather than
//! going through any response-builder abstraction, matching how little
//! machinery the rest of this crate spends on the request/response path.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";
pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";
pub const NOT_IMPLEMENTED: &[u8] = b"HTTP/1.1 501 Not Implemented\r\n\r\n";

/// Best-effort write of a canned response; errors are swallowed since the
/// connection is being torn down regardless.
pub async fn send(stream: &mut TcpStream, body: &[u8]) {
	let _ = stream.write_all(body).await;
}
