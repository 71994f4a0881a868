//! Bundles the read-only, process-wide state every worker needs: the
//! loaded CA, the shared upstream TLS client config, the enhancement
//! client, and the startup mode. Mirrors the teacher's `ProxyInputs` --
//! built once in `main`, wrapped in `Arc`, and handed to every worker
//! without any locking since nothing in it is ever mutated after startup
//! (the enhancement client's internal availability cache is the one
//! exception, and it manages its own synchronization).

use std::sync::Arc;
use std::time::SystemTime;

use crate::ca::CaIdentity;
use crate::config::Mode;
use crate::enhance::EnhanceClient;

pub struct ProxyInputs {
	pub mode: Mode,
	pub ca: Arc<CaIdentity>,
	pub upstream_tls: Arc<rustls::ClientConfig>,
	pub enhance: Arc<EnhanceClient>,
	pub start_time: SystemTime,
}
