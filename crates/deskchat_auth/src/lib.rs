#![forbid(unsafe_code)]

use core::fmt;

use thiserror::Error;

mod claims;
mod resolver;
mod session;
mod store;
mod token;

pub use claims::Claims;
pub use resolver::{CallerContext, IdentityResolver};
pub use session::{SESSION_COOKIE, decode_session_cookie, encode_legacy_session_cookie, encode_session_cookie};
pub use store::{MemoryUserStore, User, UserStore};
pub use token::{HmacScheme, RsaScheme, TokenCodec, TokenScheme};

/// Authentication failures.
///
/// All of these are handled at the point of occurrence: a failed
/// verification or lookup degrades the caller to a guest, it never tears
/// down the connection.
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("malformed token")]
	Malformed,

	#[error("invalid token signature")]
	BadSignature,

	#[error("token expired")]
	Expired,

	#[error("unknown subject: {0}")]
	UnknownSubject(String),

	#[error("no signing key configured for this scheme")]
	NoSigningKey,
}

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl serde::Serialize for SecretString {
	fn serialize<S>(&self, serializer: S) -> Result<<S as serde::Serializer>::Ok, <S as serde::Serializer>::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str("")
	}
}

impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretString::new(s))
	}
}
