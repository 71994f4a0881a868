//! Client for the external enhancement backend.
//!
//! Speaks a tiny JSON-over-HTTP protocol against a fixed local endpoint: a
//! body and URL go out base64-encoded, a (possibly rewritten) body comes
//! back the same way. A short timeout and a cooldown after a connect
//! failure keep a dead backend from ever stalling the proxy.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

const TARGET: &str = "http://127.0.0.1:5000/enhance";
const TOTAL_TIMEOUT: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const COOLDOWN: Duration = Duration::from_secs(60);
const MAX_BODY: usize = 2 * 1024 * 1024;

#[derive(Serialize)]
struct EnhanceRequest<'a> {
	html_base64: String,
	url: &'a str,
}

struct BackendState {
	available: bool,
	last_failure: Option<Instant>,
}

/// Process-wide availability cache, mutated only by `enhance` from
/// whichever worker happens to call it. Exact-once consistency isn't
/// required -- a few extra probes during failure recovery are fine.
pub struct EnhanceClient {
	http: reqwest::Client,
	target: String,
	state: Mutex<BackendState>,
}

impl EnhanceClient {
	pub fn new() -> Self {
		Self::with_target(TARGET.to_string())
	}

	fn with_target(target: String) -> Self {
		let http = reqwest::Client::builder()
			.timeout(TOTAL_TIMEOUT)
			.connect_timeout(CONNECT_TIMEOUT)
			.build()
			.expect("reqwest client config is always valid");
		Self {
			http,
			target,
			state: Mutex::new(BackendState { available: true, last_failure: None }),
		}
	}

	fn should_skip(&self) -> bool {
		let state = self.state.lock().expect("mutex poisoned");
		should_skip_given(state.available, state.last_failure, COOLDOWN)
	}

	fn record_failure(&self) {
		let mut state = self.state.lock().expect("mutex poisoned");
		state.available = false;
		state.last_failure = Some(Instant::now());
	}

	fn record_success(&self) {
		let mut state = self.state.lock().expect("mutex poisoned");
		state.available = true;
	}

	/// Package `body` and `url`, call the backend, and return the enhanced
	/// body on success. Returns `None` on any failure at any stage; callers
	/// are expected to fall back to the original response with the marker
	/// header.
	pub async fn enhance(&self, body: &[u8], url: &str) -> Option<Vec<u8>> {
		if body.is_empty() || body.len() > MAX_BODY {
			return None;
		}
		if self.should_skip() {
			tracing::debug!("enhancement backend in cooldown, skipping call");
			return None;
		}

		let request = EnhanceRequest { html_base64: BASE64.encode(body), url };
		let response = match self.http.post(&self.target).json(&request).send().await {
			Ok(response) => response,
			Err(err) => {
				tracing::warn!(error = %err, "enhancement backend unreachable");
				self.record_failure();
				return None;
			},
		};

		if !response.status().is_success() {
			tracing::warn!(status = %response.status(), "enhancement backend returned non-200");
			self.record_success(); // backend is up, just didn't enhance this one
			return None;
		}

		let text = match response.text().await {
			Ok(text) => text,
			Err(err) => {
				tracing::warn!(error = %err, "enhancement backend response unreadable");
				self.record_success();
				return None;
			},
		};
		self.record_success();

		let encoded = extract_html_base64_field(&text)?;
		let decoded = BASE64.decode(encoded).ok()?;
		if decoded.len() > MAX_BODY {
			return None;
		}
		Some(decoded)
	}
}

impl Default for EnhanceClient {
	fn default() -> Self {
		Self::new()
	}
}

fn should_skip_given(available: bool, last_failure: Option<Instant>, cooldown: Duration) -> bool {
	match last_failure {
		Some(at) if !available => at.elapsed() < cooldown,
		_ => false,
	}
}

/// Locate `"html_base64": "<value>"` by substring search rather than a
/// full JSON parse. Tolerant of surrounding whitespace; assumes the
/// base64 payload never contains a literal `"`, which is structurally
/// guaranteed by the base64 alphabet.
fn extract_html_base64_field(json: &str) -> Option<&str> {
	let key_pos = json.find("\"html_base64\"")?;
	let after_key = &json[key_pos + "\"html_base64\"".len()..];
	let colon_pos = after_key.find(':')?;
	let after_colon = after_key[colon_pos + 1..].trim_start();
	let value = after_colon.strip_prefix('"')?;
	let end = value.find('"')?;
	Some(&value[..end])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_field_tolerant_of_whitespace() {
		let json = r#"{ "html_base64" :   "aGVsbG8=" , "extra": 1 }"#;
		assert_eq!(extract_html_base64_field(json), Some("aGVsbG8="));
	}

	#[test]
	fn missing_field_returns_none() {
		assert_eq!(extract_html_base64_field(r#"{"other": 1}"#), None);
	}

	#[test]
	fn base64_roundtrip() {
		let body = b"<p>A!</p>".to_vec();
		let encoded = BASE64.encode(&body);
		let decoded = BASE64.decode(&encoded).unwrap();
		assert_eq!(decoded, body);
	}

	#[tokio::test]
	async fn skip_while_in_cooldown_without_a_connection_attempt() {
		let client = EnhanceClient::with_target("http://127.0.0.1:1/enhance".to_string());
		// First call hits a closed port and should fail fast, marking the
		// backend unavailable.
		assert!(client.enhance(b"<p>A</p>", "http://x/").await.is_none());
		assert!(client.should_skip());
	}

	#[test]
	fn cooldown_auto_resets_after_the_window_elapses() {
		let cooldown = Duration::from_millis(20);
		let failed_at = Instant::now();
		assert!(should_skip_given(false, Some(failed_at), cooldown));
		std::thread::sleep(Duration::from_millis(30));
		assert!(!should_skip_given(false, Some(failed_at), cooldown));
	}

	#[test]
	fn available_backend_never_skips() {
		assert!(!should_skip_given(true, Some(Instant::now()), COOLDOWN));
	}
}
