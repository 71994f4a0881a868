//! Cheaply-clonable immutable strings, used anywhere a hostname or header
//! value is handed between a connection's accept and its worker task.

use std::fmt;
use std::ops::Deref;

pub type Strng = arcstr::ArcStr;

/// Build a [`Strng`] from anything that is already owned, avoiding an extra
/// allocation when the caller has a `String` to give up.
pub fn new(s: impl Into<Strng>) -> Strng {
	s.into()
}

/// A non-empty, lowercased hostname. Kept distinct from `Strng` so call
/// sites that take a bare hostname can't accidentally be handed a header
/// value or URL path instead.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Hostname(Strng);

impl Hostname {
	pub fn new(raw: &str) -> Option<Self> {
		if raw.is_empty() {
			return None;
		}
		Some(Hostname(Strng::from(raw.to_ascii_lowercase())))
	}
}

impl Deref for Hostname {
	type Target = str;
	fn deref(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Hostname {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for Hostname {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.0, f)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lowercases_and_rejects_empty() {
		assert_eq!(&*Hostname::new("Example.TEST").unwrap(), "example.test");
		assert!(Hostname::new("").is_none());
	}
}
