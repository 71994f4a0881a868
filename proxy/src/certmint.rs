//! Mints a fresh leaf certificate for a hostname, signed by the loaded CA.
//!
//! The leaf reuses the CA's own keypair as its subject public key (see
//! `CaIdentity`): this is a deliberate property of the design so no
//! per-connection key generation is needed, not an accident. A certificate
//! is produced per MITM connection and never written to disk.

use std::time::{SystemTime, UNIX_EPOCH};

use rcgen::{
	BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
	KeyUsagePurpose, SanType, SerialNumber,
};
use rustls_pki_types::CertificateDer;
use time::{Duration, OffsetDateTime};

use crate::ca::CaIdentity;

const NOT_BEFORE_SKEW: Duration = Duration::seconds(86_400);
const VALIDITY: Duration = Duration::seconds(31_536_000);

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("invalid hostname: {0}")]
	InvalidHostname(String),
	#[error("rcgen: {0}")]
	Rcgen(#[from] rcgen::Error),
}

/// Serial number deterministic in `(start_time, hostname)`, matching the
/// original C implementation's `serial = serial * 31 + byte` rolling hash
/// seeded with the process start time.
fn serial_for(start_time: SystemTime, hostname: &str) -> u64 {
	let mut serial = start_time
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0);
	for byte in hostname.as_bytes() {
		serial = serial.wrapping_mul(31).wrapping_add(*byte as u64);
	}
	serial
}

/// Mint a leaf certificate for `hostname`, signed by `ca`, returning its DER
/// encoding. The certificate's private key is the CA's own private key
/// (`ca.key_der`) -- callers building a `rustls::ServerConfig` pair this DER
/// with that key directly.
pub fn mint_leaf(
	hostname: &str,
	ca: &CaIdentity,
	start_time: SystemTime,
) -> Result<CertificateDer<'static>, Error> {
	if hostname.is_empty() {
		return Err(Error::InvalidHostname(hostname.to_string()));
	}

	let mut dn = DistinguishedName::new();
	dn.push(DnType::CountryName, "US");
	dn.push(DnType::OrganizationName, "CS112 Proxy");
	dn.push(DnType::CommonName, hostname);

	let now = OffsetDateTime::now_utc();
	let mut params = CertificateParams::default();
	params.distinguished_name = dn;
	params.not_before = now - NOT_BEFORE_SKEW;
	params.not_after = now + VALIDITY;
	params.is_ca = IsCa::NoCa;
	params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
	params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
	params.subject_alt_names = vec![SanType::DnsName(hostname.try_into().map_err(|_| {
		Error::InvalidHostname(hostname.to_string())
	})?)];
	params.serial_number = Some(SerialNumber::from(serial_for(start_time, hostname).to_be_bytes().to_vec()));

	// Reuse the CA keypair as the leaf's keypair: the leaf's public key
	// equals the CA's public key, and the CA key also produces the
	// signature. See module docs and spec §3's invariant.
	let cert = params.signed_by(ca.rcgen_keypair(), ca.rcgen_issuer(), ca.rcgen_keypair())?;
	Ok(cert.der().clone())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ca::CaIdentity;
	use std::io::Write;
	use x509_parser::certificate::X509Certificate;
	use x509_parser::extensions::GeneralName;
	use x509_parser::prelude::FromDer;

	fn test_ca() -> CaIdentity {
		let dir = std::env::temp_dir().join(format!("proxy-certmint-test-{:?}", std::thread::current().id()));
		std::fs::create_dir_all(&dir).unwrap();

		let keypair = rcgen::KeyPair::generate().unwrap();
		let mut params = rcgen::CertificateParams::default();
		let mut dn = rcgen::DistinguishedName::new();
		dn.push(rcgen::DnType::CommonName, "Test Root CA");
		params.distinguished_name = dn;
		params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
		params.key_usages = vec![rcgen::KeyUsagePurpose::KeyCertSign, rcgen::KeyUsagePurpose::CrlSign];
		let cert = params.self_signed(&keypair).unwrap();

		let cert_path = dir.join("ca.crt");
		let key_path = dir.join("ca.key");
		std::fs::File::create(&cert_path).unwrap().write_all(cert.pem().as_bytes()).unwrap();
		std::fs::File::create(&key_path).unwrap().write_all(keypair.serialize_pem().as_bytes()).unwrap();

		CaIdentity::load(&cert_path, &key_path).unwrap()
	}

	#[test]
	fn serial_is_deterministic_in_time_and_hostname() {
		let t = UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
		assert_eq!(serial_for(t, "example.test"), serial_for(t, "example.test"));
		assert_ne!(serial_for(t, "example.test"), serial_for(t, "other.test"));
	}

	#[test]
	fn leaf_has_correct_cn_san_and_issuer() {
		let ca = test_ca();
		let der = mint_leaf("example.test", &ca, SystemTime::now()).unwrap();
		let (_, cert) = X509Certificate::from_der(der.as_ref()).unwrap();

		assert_eq!(cert.subject().to_string(), "CN=example.test, O=CS112 Proxy, C=US");
		assert_eq!(cert.issuer().to_string(), ca.subject);

		let san = cert.subject_alternative_name().unwrap().unwrap();
		let dns_names: Vec<_> = san
			.value
			.general_names
			.iter()
			.filter_map(|n| match n {
				GeneralName::DNSName(name) => Some(*name),
				_ => None,
			})
			.collect();
		assert_eq!(dns_names, vec!["example.test"]);
	}

	#[test]
	fn leaf_signature_verifies_under_ca_public_key() {
		let ca = test_ca();
		let der = mint_leaf("example.test", &ca, SystemTime::now()).unwrap();
		let (_, leaf) = X509Certificate::from_der(der.as_ref()).unwrap();
		let (_, ca_cert) = X509Certificate::from_der(ca.cert_der.as_ref()).unwrap();

		assert!(leaf.verify_signature(Some(ca_cert.public_key())).is_ok());
		// And, per the design's key-reuse invariant, the leaf's own public
		// key is literally the CA's public key.
		assert_eq!(leaf.public_key().raw, ca_cert.public_key().raw);
	}

	#[test]
	fn rejects_empty_hostname() {
		let ca = test_ca();
		assert!(mint_leaf("", &ca, SystemTime::now()).is_err());
	}
}
