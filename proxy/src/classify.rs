//! Reads the first request line out of the initial receive and decides
//! which handler a connection belongs to.
//!
//! The first `recv` is treated as sufficient to hold the whole request
//! line; the classifier does not loop to drain a slow or adversarial
//! client that splits it across multiple segments. That is a known,
//! accepted limitation carried over unchanged from the design this is
//! based on.

use agent_core::Hostname;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
	Connect { host: Hostname, port: u16 },
	Plain { method: String, request_uri: String, version: String },
	/// A recognized method whose request line is missing a required token
	/// (no CONNECT target, or fewer than the three space-separated tokens
	/// a request line needs). Distinct from `Unsupported`: this is a parse
	/// error (400), not an unrecognized method (501).
	Malformed,
	Unsupported,
}

pub fn classify(buf: &[u8]) -> Classification {
	let line_end = buf.iter().position(|&b| b == b'\r').unwrap_or(buf.len());
	let line = String::from_utf8_lossy(&buf[..line_end]);
	let mut parts = line.split_whitespace();

	let Some(method) = parts.next() else {
		return Classification::Unsupported;
	};

	match method {
		"CONNECT" => match parts.next() {
			Some(target) => {
				let (host, port) = parse_host_port(target, 443);
				match Hostname::new(&host) {
					Some(host) => Classification::Connect { host, port },
					None => Classification::Malformed,
				}
			},
			None => Classification::Malformed,
		},
		"GET" | "POST" | "HEAD" => match (parts.next(), parts.next()) {
			(Some(request_uri), Some(version)) => Classification::Plain {
				method: method.to_string(),
				request_uri: request_uri.to_string(),
				version: version.to_string(),
			},
			_ => Classification::Malformed,
		},
		_ => Classification::Unsupported,
	}
}

/// Split `host:port` (or a bare host) into its parts, defaulting the port
/// when absent. Bracketed IPv6 literals are not handled -- out of scope
/// for this proxy's intended use against ordinary HTTP(S) origins.
pub fn parse_host_port(s: &str, default_port: u16) -> (String, u16) {
	match s.rsplit_once(':') {
		Some((host, port)) => match port.parse() {
			Ok(port) => (host.to_string(), port),
			Err(_) => (s.to_string(), default_port),
		},
		None => (s.to_string(), default_port),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_connect() {
		let req = b"CONNECT example.test:443 HTTP/1.1\r\n\r\n";
		assert_eq!(
			classify(req),
			Classification::Connect { host: Hostname::new("example.test").unwrap(), port: 443 }
		);
	}

	#[test]
	fn classifies_plain_methods() {
		let req = b"GET /hello HTTP/1.1\r\nHost: example.test\r\n\r\n";
		assert_eq!(
			classify(req),
			Classification::Plain {
				method: "GET".to_string(),
				request_uri: "/hello".to_string(),
				version: "HTTP/1.1".to_string(),
			}
		);
	}

	#[test]
	fn rejects_other_methods() {
		assert_eq!(classify(b"PUT / HTTP/1.1\r\n\r\n"), Classification::Unsupported);
	}

	#[test]
	fn connect_without_a_target_is_malformed_not_unsupported() {
		assert_eq!(classify(b"CONNECT HTTP/1.1\r\n\r\n"), Classification::Malformed);
	}

	#[test]
	fn plain_request_missing_tokens_is_malformed() {
		assert_eq!(classify(b"GET\r\n\r\n"), Classification::Malformed);
		assert_eq!(classify(b"GET /hello\r\n\r\n"), Classification::Malformed);
	}

	#[test]
	fn defaults_port_when_absent() {
		assert_eq!(parse_host_port("example.test", 80), ("example.test".to_string(), 80));
		assert_eq!(parse_host_port("example.test:8080", 80), ("example.test".to_string(), 8080));
	}
}
