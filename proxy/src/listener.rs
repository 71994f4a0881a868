//! Binds the listening socket and spawns one detached worker per accepted
//! connection. The accept loop itself never touches connection state past
//! handing the socket to its worker -- no shared mutable state, no
//! backpressure from slow workers.

use std::io;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::classify::Classification;
use crate::inputs::ProxyInputs;
use crate::{classify, io_util, mitm, plain_http, wire};

const HEADER_BUF: usize = 8192;

pub async fn run(port: u16, inputs: Arc<ProxyInputs>) -> io::Result<()> {
	let listener = TcpListener::bind(("0.0.0.0", port)).await?;
	tracing::info!(port, mode = ?inputs.mode, "proxy listening");

	loop {
		let (stream, peer) = match listener.accept().await {
			Ok(pair) => pair,
			Err(err) => {
				tracing::warn!(error = %err, "accept failed");
				continue;
			},
		};
		let inputs = Arc::clone(&inputs);
		tokio::spawn(async move {
			tracing::debug!(%peer, "connection accepted");
			let start = std::time::Instant::now();
			worker(stream, inputs).await;
			tracing::debug!(%peer, elapsed = ?start.elapsed(), "connection completed");
		});
	}
}

async fn worker(mut stream: TcpStream, inputs: Arc<ProxyInputs>) {
	let head = match io_util::read_once(&mut stream, HEADER_BUF).await {
		Ok(buf) if !buf.is_empty() => buf,
		_ => return,
	};

	match classify::classify(&head) {
		Classification::Connect { host, port } => {
			tracing::debug!(host = %host, port, "dispatching to mitm handler");
			mitm::handle(stream, host, port, &inputs).await;
		},
		Classification::Plain { request_uri, .. } => {
			tracing::debug!(uri = %request_uri, "dispatching to plain-http handler");
			plain_http::handle(stream, head, &request_uri, inputs.mode, &inputs.enhance).await;
		},
		Classification::Malformed => {
			wire::send(&mut stream, wire::BAD_REQUEST).await;
		},
		Classification::Unsupported => {
			wire::send(&mut stream, wire::NOT_IMPLEMENTED).await;
		},
	}
}
