#![forbid(unsafe_code)]

use std::sync::Arc;

use deskchat_domain::{Identity, Role};
use tracing::{debug, warn};

use crate::session::decode_session_cookie;
use crate::store::UserStore;
use crate::token::{RsaScheme, TokenCodec, TokenScheme};
use crate::{AuthError, Claims};

/// Verified caller identity stamped onto every inbound event.
#[derive(Debug, Clone)]
pub struct CallerContext {
	pub identity: Identity,
	pub role: Role,
	pub display_name: String,
	pub session_id: String,
}

/// Resolves caller identity and role once per inbound event.
///
/// No server-side session object is retained; a credential is verified
/// and looked up fresh every time, and expiry is re-checked per event.
pub struct IdentityResolver {
	users: Arc<dyn UserStore>,
	codec: TokenCodec,
}

impl IdentityResolver {
	pub fn new(users: Arc<dyn UserStore>, codec: TokenCodec) -> Self {
		Self { users, codec }
	}

	/// Resolve the caller from an optional session-cookie value.
	///
	/// Absent, invalid, or expired credentials fall back to a guest
	/// identity bound to the transport session. Unauthenticated
	/// participation is a product decision, not an error path.
	pub async fn resolve(&self, credential: Option<&str>, session_id: &str) -> CallerContext {
		let Some(raw) = credential else {
			return self.resolve_guest(session_id);
		};

		match self.resolve_credential(raw, session_id).await {
			Ok(ctx) => ctx,
			Err(err) => {
				debug!(error = %err, "credential rejected; resolving caller as guest");
				metrics::counter!("deskchat_auth_guest_fallback_total").increment(1);
				self.resolve_guest(session_id)
			}
		}
	}

	/// Resolve a registered caller from a verified token subject.
	pub async fn resolve_from_token(
		&self,
		scheme: TokenScheme,
		claims: &Claims,
		session_id: &str,
	) -> Result<CallerContext, AuthError> {
		let user = match scheme {
			TokenScheme::Rsa => {
				let id = RsaScheme::subject_id(claims)?;
				self.users.find_by_id(id).await
			}
			TokenScheme::LegacyHmac => self.users.find_by_username(&claims.sub).await,
		};

		let user = user.ok_or_else(|| AuthError::UnknownSubject(claims.sub.clone()))?;
		let identity = Identity::new(&user.username).map_err(|_| AuthError::Malformed)?;

		Ok(CallerContext {
			identity,
			role: user.role,
			display_name: user.username,
			session_id: session_id.to_string(),
		})
	}

	/// Deterministic guest resolution from the transport session id.
	pub fn resolve_guest(&self, session_id: &str) -> CallerContext {
		CallerContext {
			identity: Identity::guest(session_id),
			role: Role::Guest,
			display_name: format!("Guest #{session_id}"),
			session_id: session_id.to_string(),
		}
	}

	async fn resolve_credential(&self, raw: &str, session_id: &str) -> Result<CallerContext, AuthError> {
		let (scheme, token) = decode_session_cookie(raw)?;
		if scheme == TokenScheme::LegacyHmac {
			warn!("caller presented a legacy symmetric-scheme credential");
		}

		let claims = self.codec.verify(scheme, &token)?;
		self.resolve_from_token(scheme, &claims, session_id).await
	}
}
