//! CLI entry point: parse arguments, load the CA, build the shared TLS
//! client config, install the SIGPIPE ignore, and hand off to the accept
//! loop. Anything that fails here is a startup error -- logged and fatal,
//! per the error taxonomy in the design this follows.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use clap::Parser;
use proxy::{ProxyInputs, ca::CaIdentity, config, enhance::EnhanceClient, listener, tls};

/// `proxy <port> <ca_cert_path> <ca_key_path> [llm=true|llm=false]`
#[derive(Parser, Debug)]
#[command(name = "proxy", about = "HTTPS-intercepting forward proxy")]
struct Args {
	port: u16,
	ca_cert_path: PathBuf,
	ca_key_path: PathBuf,
	/// `llm=true` or `llm=false`; defaults to disabled, warns on anything else.
	mode: Option<String>,
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.init();

	ignore_sigpipe();

	if let Err(err) = run().await {
		tracing::error!(error = %err, "fatal startup error");
		std::process::exit(1);
	}
}

async fn run() -> anyhow::Result<()> {
	let args = Args::parse();
	let mode = config::parse_mode_arg(args.mode.as_deref());

	let ca = CaIdentity::load(&args.ca_cert_path, &args.ca_key_path)?;
	let upstream_tls = tls::client_config()?;

	tracing::info!(port = args.port, mode = ?mode, subject = %ca.subject, "starting proxy");

	let inputs = Arc::new(ProxyInputs {
		mode,
		ca: Arc::new(ca),
		upstream_tls,
		enhance: Arc::new(EnhanceClient::new()),
		start_time: SystemTime::now(),
	});

	listener::run(args.port, inputs).await?;
	Ok(())
}

/// `SIGPIPE` from a peer that closed its read side must be ignored so a
/// failed write surfaces as an `EPIPE` return code instead of killing the
/// process. Installed once, before the accept loop starts.
fn ignore_sigpipe() {
	// SAFETY: installing a well-known, one-time signal disposition at
	// startup before any other thread exists.
	unsafe {
		libc::signal(libc::SIGPIPE, libc::SIG_IGN);
	}
}
