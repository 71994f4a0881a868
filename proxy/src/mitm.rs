//! The CONNECT/MITM handler: two TLS handshakes bridged through the
//! proxy, with a freshly minted leaf certificate standing in for the
//! origin's own. Dispatches to fast-relay or buffered-enhance depending
//! on the active mode, exactly as the plain-HTTP handler does.

use std::sync::Arc;
use std::time::Duration;

use agent_core::Hostname;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::Mode;
use crate::inputs::ProxyInputs;
use crate::io_util::{IO_TIMEOUT, MAX_RESPONSE, RELAY_CHUNK, read_buffered_response, read_once};
use crate::{certmint, classify, headers, tls, wire};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const REQUEST_HEAD_CAP: usize = 8192;

/// Handle one `CONNECT host:port` tunnel already classified by
/// [`crate::classify`]. `client` is still plaintext on entry.
pub async fn handle(mut client: TcpStream, hostname: Hostname, port: u16, inputs: &ProxyInputs) {
	let Ok(server_name) = ServerName::try_from(hostname.to_string()) else {
		wire::send(&mut client, wire::BAD_REQUEST).await;
		return;
	};

	let Ok(Ok(origin_tcp)) = timeout(CONNECT_TIMEOUT, TcpStream::connect((&*hostname, port))).await else {
		tracing::debug!(host = %hostname, port, "origin connect failed");
		wire::send(&mut client, wire::BAD_GATEWAY).await;
		return;
	};

	let connector = TlsConnector::from(Arc::clone(&inputs.upstream_tls));
	let origin_tls = match timeout(CONNECT_TIMEOUT, connector.connect(server_name, origin_tcp)).await {
		Ok(Ok(stream)) => stream,
		_ => {
			tracing::debug!(host = %hostname, "upstream tls handshake failed");
			wire::send(&mut client, wire::BAD_GATEWAY).await;
			return;
		},
	};

	wire::send(&mut client, wire::CONNECTION_ESTABLISHED).await;

	let leaf = match certmint::mint_leaf(&hostname, &inputs.ca, inputs.start_time) {
		Ok(leaf) => leaf,
		Err(err) => {
			tracing::warn!(host = %hostname, error = %err, "certificate minting failed");
			return;
		},
	};
	let server_config = match tls::server_config(leaf, &inputs.ca) {
		Ok(cfg) => cfg,
		Err(err) => {
			tracing::warn!(host = %hostname, error = %err, "tls server config failed");
			return;
		},
	};
	let acceptor = TlsAcceptor::from(server_config);
	let client_tls = match timeout(IDLE_TIMEOUT, acceptor.accept(client)).await {
		Ok(Ok(stream)) => stream,
		_ => {
			tracing::debug!(host = %hostname, "downstream tls handshake failed");
			return;
		},
	};

	tracing::debug!(host = %hostname, "mitm tunnel established");

	match inputs.mode {
		Mode::FastRelay => relay(client_tls, origin_tls).await,
		Mode::Enhance => enhance_tunnel(client_tls, origin_tls, &hostname, inputs).await,
	}
}

type ClientTls = tokio_rustls::server::TlsStream<TcpStream>;
type OriginTls = tokio_rustls::client::TlsStream<TcpStream>;

/// Single-task, cooperative relay of both directions via one `select!`
/// loop rather than two independently-progressing futures: the moment
/// either side hits EOF, an I/O error, or its idle timeout, the loop
/// breaks and both halves are dropped together, tearing the whole tunnel
/// down immediately instead of leaving the other direction to idle out
/// on its own.
async fn relay(client_tls: ClientTls, origin_tls: OriginTls) {
	let (mut client_read, mut client_write) = tokio::io::split(client_tls);
	let (mut origin_read, mut origin_write) = tokio::io::split(origin_tls);

	let mut client_buf = vec![0u8; RELAY_CHUNK];
	let mut origin_buf = vec![0u8; RELAY_CHUNK];
	let mut first_response_chunk = true;

	loop {
		tokio::select! {
			result = timeout(IDLE_TIMEOUT, client_read.read(&mut client_buf)) => {
				let n = match result {
					Ok(Ok(0)) | Err(_) => break,
					Ok(Err(_)) => break,
					Ok(Ok(n)) => n,
				};
				if origin_write.write_all(&client_buf[..n]).await.is_err() {
					break;
				}
			},
			result = timeout(IDLE_TIMEOUT, origin_read.read(&mut origin_buf)) => {
				let n = match result {
					Ok(Ok(0)) | Err(_) => break,
					Ok(Err(_)) => break,
					Ok(Ok(n)) => n,
				};
				if first_response_chunk {
					first_response_chunk = false;
					if origin_buf[..n].starts_with(b"HTTP/") {
						let mut chunk = origin_buf[..n].to_vec();
						headers::inject_header(&mut chunk, chunk.len() + 32);
						if client_write.write_all(&chunk).await.is_err() {
							break;
						}
						continue;
					}
				}
				if client_write.write_all(&origin_buf[..n]).await.is_err() {
					break;
				}
			},
		}
	}
}

/// Read exactly one request/response exchange, offer the body to the
/// enhancement backend, and close. Pipelined or keep-alive use of the
/// same tunnel is not supported, as spec'd.
async fn enhance_tunnel(mut client_tls: ClientTls, mut origin_tls: OriginTls, hostname: &str, inputs: &ProxyInputs) {
	let mut request = match read_once(&mut client_tls, REQUEST_HEAD_CAP).await {
		Ok(buf) => buf,
		Err(_) => return,
	};
	if request.is_empty() {
		return;
	}

	let request_uri = match classify::classify(&request) {
		classify::Classification::Plain { request_uri, .. } => request_uri,
		_ => "/".to_string(),
	};

	headers::excise_accept_encoding(&mut request);

	if timeout(IO_TIMEOUT, origin_tls.write_all(&request)).await.is_err() {
		return;
	}

	let buf = read_buffered_response(&mut origin_tls).await;

	if let Some(head_end) = headers::header_block_end(&buf) {
		let head = &buf[..head_end];
		let body = &buf[head_end + 4..];
		let content_type = headers::extract_content_type(head).unwrap_or_default();
		let is_html = headers::is_html_content_type(&content_type);
		let is_compressed = headers::has_content_encoding(head);

		if is_html && !is_compressed && !body.is_empty() && buf.len() < MAX_RESPONSE {
			let url = format!("https://{hostname}{request_uri}");
			if let Some(enhanced) = inputs.enhance.enhance(body, &url).await {
				let response = reissue(headers::first_line(&buf), &enhanced);
				let _ = client_tls.write_all(&response).await;
				return;
			}
		}
	}

	let mut fallback = buf;
	headers::inject_header(&mut fallback, fallback.len() + 32);
	let _ = client_tls.write_all(&fallback).await;
}

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
		assert!(text.contains("Content-Length: 9\r\n"));
		assert!(text.ends_with("<p>A!</p>"));
	}
}
