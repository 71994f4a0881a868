//! Loads the CA certificate and private key from disk once at startup.
//!
//! The loaded material is wrapped in `Arc` by the caller and handed to
//! every worker as a read-only reference; nothing here is mutated after
//! [`CaIdentity::load`] returns.

use std::io::Cursor;
use std::path::Path;

use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("reading {path}: {source}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("{path} does not contain a PEM certificate")]
	NoCertificate { path: String },
	#[error("{path} does not contain a PEM private key")]
	NoPrivateKey { path: String },
	#[error("parsing CA certificate: {0}")]
	ParseCertificate(String),
	#[error("rcgen rejected the CA material: {0}")]
	Rcgen(#[from] rcgen::Error),
}

/// The CA's certificate and key, plus the `rcgen` objects derived from them
/// that the certificate minter needs to sign leaves.
pub struct CaIdentity {
	pub cert_der: CertificateDer<'static>,
	pub key_der: PrivateKeyDer<'static>,
	pub subject: String,
	issuer: rcgen::Certificate,
	keypair: rcgen::KeyPair,
}

impl CaIdentity {
	pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, Error> {
		let cert_pem = std::fs::read_to_string(cert_path).map_err(|source| Error::Read {
			path: cert_path.display().to_string(),
			source,
		})?;
		let key_pem = std::fs::read_to_string(key_path).map_err(|source| Error::Read {
			path: key_path.display().to_string(),
			source,
		})?;

		let cert_der = parse_certificate(&cert_pem, &cert_path.display().to_string())?;
		let key_der = parse_private_key(&key_pem, &key_path.display().to_string())?;

		let (_, x509) = x509_parser::parse_x509_certificate(cert_der.as_ref())
			.map_err(|e| Error::ParseCertificate(e.to_string()))?;
		let subject = x509.subject().to_string();

		// rcgen needs its own `KeyPair` and a `Certificate` to act as the
		// issuer when signing a leaf. Re-deriving the issuer from the
		// already-loaded PEM keeps the signature chain consistent with the
		// certificate actually on disk rather than minting a new CA.
		let keypair = rcgen::KeyPair::from_pem(&key_pem)?;
		let issuer = rcgen::CertificateParams::from_ca_cert_pem(&cert_pem)?.self_signed(&keypair)?;

		Ok(CaIdentity {
			cert_der,
			key_der,
			subject,
			issuer,
			keypair,
		})
	}

	pub(crate) fn rcgen_issuer(&self) -> &rcgen::Certificate {
		&self.issuer
	}

	pub(crate) fn rcgen_keypair(&self) -> &rcgen::KeyPair {
		&self.keypair
	}
}

fn parse_certificate(pem: &str, path: &str) -> Result<CertificateDer<'static>, Error> {
	let mut reader = Cursor::new(pem.as_bytes());
	match rustls_pemfile::read_one(&mut reader).map_err(|e| Error::ParseCertificate(e.to_string()))? {
		Some(Item::X509Certificate(der)) => Ok(der),
		_ => Err(Error::NoCertificate { path: path.to_string() }),
	}
}

fn parse_private_key(pem: &str, path: &str) -> Result<PrivateKeyDer<'static>, Error> {
	let mut reader = Cursor::new(pem.as_bytes());
	loop {
		match rustls_pemfile::read_one(&mut reader).map_err(|e| Error::ParseCertificate(e.to_string()))? {
			Some(Item::Pkcs8Key(k)) => return Ok(PrivateKeyDer::Pkcs8(k)),
			Some(Item::Sec1Key(k)) => return Ok(PrivateKeyDer::Sec1(k)),
			Some(Item::Pkcs1Key(k)) => return Ok(PrivateKeyDer::Pkcs1(k)),
			Some(_) => continue,
			None => return Err(Error::NoPrivateKey { path: path.to_string() }),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn write_self_signed_ca(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
		let keypair = rcgen::KeyPair::generate().unwrap();
		let mut params = rcgen::CertificateParams::default();
		let mut dn = rcgen::DistinguishedName::new();
		dn.push(rcgen::DnType::CommonName, "Test Root CA");
		params.distinguished_name = dn;
		params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
		params.key_usages = vec![
			rcgen::KeyUsagePurpose::KeyCertSign,
			rcgen::KeyUsagePurpose::CrlSign,
		];
		let cert = params.self_signed(&keypair).unwrap();

		let cert_path = dir.join("ca.crt");
		let key_path = dir.join("ca.key");
		std::fs::File::create(&cert_path)
			.unwrap()
			.write_all(cert.pem().as_bytes())
			.unwrap();
		std::fs::File::create(&key_path)
			.unwrap()
			.write_all(keypair.serialize_pem().as_bytes())
			.unwrap();
		(cert_path, key_path)
	}

	#[test]
	fn loads_generated_ca() {
		let dir = std::env::temp_dir().join(format!("proxy-ca-test-{:?}", std::thread::current().id()));
		std::fs::create_dir_all(&dir).unwrap();
		let (cert_path, key_path) = write_self_signed_ca(&dir);

		let ca = CaIdentity::load(&cert_path, &key_path).unwrap();
		assert!(ca.subject.contains("Test Root CA"));
	}

	#[test]
	fn missing_file_is_an_error() {
		let dir = std::env::temp_dir();
		let err = CaIdentity::load(&dir.join("does-not-exist.crt"), &dir.join("does-not-exist.key"));
		assert!(matches!(err, Err(Error::Read { .. })));
	}
}
