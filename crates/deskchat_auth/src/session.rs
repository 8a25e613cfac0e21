#![forbid(unsafe_code)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::{AuthError, TokenScheme};

/// Cookie name the transport layer extracts the credential from.
pub const SESSION_COOKIE: &str = "session";

/// Current-scheme cookie body: base64 of this JSON wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionCookie {
	jwt: String,
}

/// Decode a session-cookie value into the scheme it was produced under
/// and the raw token.
///
/// Current credentials wrap the token as JSON `{"jwt": ...}`; legacy
/// credentials are the bare token. The shape selects the scheme, so one
/// token is never parsed under both.
pub fn decode_session_cookie(value: &str) -> Result<(TokenScheme, String), AuthError> {
	let decoded = STANDARD.decode(value.trim()).map_err(|_| AuthError::Malformed)?;
	let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;

	if let Ok(session) = serde_json::from_str::<SessionCookie>(&decoded) {
		return Ok((TokenScheme::Rsa, session.jwt));
	}

	Ok((TokenScheme::LegacyHmac, decoded))
}

/// Encode a current-scheme token as a session-cookie value.
pub fn encode_session_cookie(token: &str) -> String {
	let wrapper = SessionCookie { jwt: token.to_string() };
	// Serializing a two-field struct cannot fail.
	let json = serde_json::to_string(&wrapper).unwrap_or_default();
	STANDARD.encode(json)
}

/// Encode a legacy token as a session-cookie value.
pub fn encode_legacy_session_cookie(token: &str) -> String {
	STANDARD.encode(token)
}
