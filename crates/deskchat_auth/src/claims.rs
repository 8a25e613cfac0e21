#![forbid(unsafe_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Signed session-token claims.
///
/// `roles` carries authority strings (e.g. `ROLE_ADMIN`) opaquely; the
/// codec never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
	pub sub: String,

	#[serde(default)]
	pub roles: Vec<String>,

	pub iat: u64,
	pub exp: u64,
}

impl Claims {
	/// Claims for `subject` issued now, expiring after `validity`.
	pub fn new(subject: impl Into<String>, roles: Vec<String>, validity: Duration) -> Self {
		let now = unix_now();
		Self {
			sub: subject.into(),
			roles,
			iat: now,
			exp: now.saturating_add(validity.as_secs()),
		}
	}

	pub fn is_expired(&self, now: u64) -> bool {
		self.exp <= now
	}
}

/// Current Unix time in seconds.
#[inline]
pub(crate) fn unix_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
