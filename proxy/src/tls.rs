//! Builds the server-side and client-side TLS configurations used by the
//! MITM handler: one `ServerConfig` per intercepted connection (carrying
//! the freshly-minted leaf), and a single shared `ClientConfig` used for
//! every upstream handshake.
//!
//! The client config disables upstream certificate verification entirely
//! -- the proxy itself is the trust anchor its users already chose to
//! accept, so re-verifying the origin's certificate buys nothing and would
//! just break on self-signed or misconfigured origins.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, ServerConfig};
use rustls_pki_types::CertificateDer;

use crate::ca::CaIdentity;

pub static ALL_TLS_VERSIONS: &[&rustls::SupportedProtocolVersion] =
	&[&rustls::version::TLS12, &rustls::version::TLS13];

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("tls configuration: {0}")]
	Rustls(#[from] rustls::Error),
}

pub fn provider() -> Arc<CryptoProvider> {
	Arc::new(rustls::crypto::ring::default_provider())
}

/// Build the shared client config used for every outbound (proxy-to-origin)
/// handshake. Never changes after startup.
pub fn client_config() -> Result<Arc<ClientConfig>, Error> {
	let mut cfg = ClientConfig::builder_with_provider(provider())
		.with_protocol_versions(ALL_TLS_VERSIONS)
		.expect("protocol versions are valid")
		.dangerous() // disabling verification is an explicit, intentional opt-in
		.with_custom_certificate_verifier(Arc::new(insecure::NoVerifier))
		.with_no_client_auth();
	cfg.alpn_protocols.clear();
	Ok(Arc::new(cfg))
}

/// Build a fresh server config presenting `leaf` and the CA's private key
/// to the downstream client. One of these is built per intercepted
/// connection since the leaf differs per hostname.
pub fn server_config(leaf: CertificateDer<'static>, ca: &CaIdentity) -> Result<Arc<ServerConfig>, Error> {
	let cfg = ServerConfig::builder_with_provider(provider())
		.with_protocol_versions(ALL_TLS_VERSIONS)
		.expect("protocol versions are valid")
		.with_no_client_auth()
		.with_single_cert(vec![leaf], ca.key_der.clone_key())?;
	Ok(Arc::new(cfg))
}

pub mod insecure {
	use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
	use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
	use rustls::{DigitallySignedStruct, SignatureScheme};

	/// Accepts any certificate chain the origin presents. The proxy's own
	/// callers are the ones deciding whether to trust the proxy; this
	/// client leg exists only to terminate TLS so the body can be read.
	#[derive(Debug)]
	pub struct NoVerifier;

	impl ServerCertVerifier for NoVerifier {
		fn verify_server_cert(
			&self,
			_end_entity: &CertificateDer<'_>,
			_intermediates: &[CertificateDer<'_>],
			_server_name: &ServerName<'_>,
			_ocsp_response: &[u8],
			_now: UnixTime,
		) -> Result<ServerCertVerified, rustls::Error> {
			Ok(ServerCertVerified::assertion())
		}

		fn verify_tls12_signature(
			&self,
			_message: &[u8],
			_cert: &CertificateDer<'_>,
			_dss: &DigitallySignedStruct,
		) -> Result<HandshakeSignatureValid, rustls::Error> {
			Ok(HandshakeSignatureValid::assertion())
		}

		fn verify_tls13_signature(
			&self,
			_message: &[u8],
			_cert: &CertificateDer<'_>,
			_dss: &DigitallySignedStruct,
		) -> Result<HandshakeSignatureValid, rustls::Error> {
			Ok(HandshakeSignatureValid::assertion())
		}

		fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
			vec![
				SignatureScheme::RSA_PKCS1_SHA256,
				SignatureScheme::RSA_PKCS1_SHA384,
				SignatureScheme::RSA_PKCS1_SHA512,
				SignatureScheme::ECDSA_NISTP256_SHA256,
				SignatureScheme::ECDSA_NISTP384_SHA384,
				SignatureScheme::RSA_PSS_SHA256,
				SignatureScheme::RSA_PSS_SHA384,
				SignatureScheme::RSA_PSS_SHA512,
				SignatureScheme::ED25519,
			]
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn client_config_disables_verification() {
		let cfg = client_config().unwrap();
		// Built successfully with the custom verifier installed; rustls has
		// no public accessor for the verifier beyond this, so the real
		// assertion of "accepts anything" lives in an end-to-end handshake
		// test rather than here.
		assert!(!cfg.alpn_protocols.iter().any(|p| p == b"h2"));
	}
}
