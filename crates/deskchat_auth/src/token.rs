#![forbid(unsafe_code)]

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{Keypair, SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::claims::{Claims, unix_now};
use crate::{AuthError, SecretString};

/// The two signing schemes in circulation.
///
/// A token is valid only under the scheme it was produced with. The
/// transport boundary selects the scheme from the credential shape (see
/// `decode_session_cookie`); the codec never guesses between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
	/// Symmetric HMAC-SHA256 keyed by a configured passphrase; the
	/// subject is a username. Deprecated, kept for the migration window.
	LegacyHmac,

	/// RSASSA-PKCS1-v1.5/SHA-256; the subject is a numeric user id in
	/// lowercase hexadecimal.
	Rsa,
}

/// Legacy symmetric scheme: `v1.<payload-b64>.<sig-b64>`.
pub struct HmacScheme {
	secret: SecretString,
	validity: Duration,
}

const HMAC_TAG: &str = "v1";
const RSA_TAG: &str = "v2";

impl HmacScheme {
	pub fn new(secret: SecretString, validity: Duration) -> Self {
		Self { secret, validity }
	}

	/// Issue a signed token for `subject` carrying `roles` opaquely.
	pub fn issue(&self, subject: &str, roles: &[String]) -> Result<String, AuthError> {
		let claims = Claims::new(subject, roles.to_vec(), self.validity);
		let payload = serde_json::to_vec(&claims).map_err(|_| AuthError::Malformed)?;
		let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
		let sig = hmac_sign(payload_b64.as_bytes(), self.secret.expose().as_bytes())?;
		Ok(format!("{HMAC_TAG}.{payload_b64}.{}", URL_SAFE_NO_PAD.encode(sig)))
	}

	/// Verify signature integrity and expiry. Fails closed on any
	/// structural error.
	pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
		let (payload_b64, sig_b64) = split_token(token, HMAC_TAG)?;

		let expected = hmac_sign(payload_b64.as_bytes(), self.secret.expose().as_bytes())?;
		let provided = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| AuthError::Malformed)?;
		if !constant_time_eq(&expected, &provided) {
			return Err(AuthError::BadSignature);
		}

		decode_claims(payload_b64)
	}

	#[cfg(test)]
	pub(crate) fn issue_with_validity(&self, subject: &str, roles: &[String], validity: Duration) -> String {
		let claims = Claims::new(subject, roles.to_vec(), validity);
		let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
		let sig = hmac_sign(payload_b64.as_bytes(), self.secret.expose().as_bytes()).unwrap();
		format!("{HMAC_TAG}.{payload_b64}.{}", URL_SAFE_NO_PAD.encode(sig))
	}
}

/// Current asymmetric scheme: `v2.<payload-b64>.<sig-b64>`.
///
/// Verification only needs the public key; issuing requires the private
/// half and is typically done by the credential-exchange side.
pub struct RsaScheme {
	signing: Option<SigningKey<Sha256>>,
	verifying: VerifyingKey<Sha256>,
	validity: Duration,
}

impl RsaScheme {
	/// Load keys from PEM (X.509 public, PKCS#8 private).
	pub fn from_pem(public_pem: &str, private_pem: Option<&str>, validity: Duration) -> anyhow::Result<Self> {
		use anyhow::Context as _;

		let public = RsaPublicKey::from_public_key_pem(public_pem).context("parse RSA public key PEM")?;
		let signing = match private_pem {
			Some(pem) => Some(SigningKey::new(
				RsaPrivateKey::from_pkcs8_pem(pem).context("parse RSA private key PEM")?,
			)),
			None => None,
		};

		Ok(Self {
			signing,
			verifying: VerifyingKey::new(public),
			validity,
		})
	}

	/// Generate an ephemeral keypair. Dev use only: tokens do not survive
	/// a restart.
	pub fn generate_dev(validity: Duration) -> anyhow::Result<Self> {
		let mut rng = rand::rngs::OsRng;
		let private = RsaPrivateKey::new(&mut rng, 2048)?;
		let signing = SigningKey::new(private);
		let verifying = signing.verifying_key();

		Ok(Self {
			signing: Some(signing),
			verifying,
			validity,
		})
	}

	/// Issue a token for the numeric user id, encoded in hexadecimal.
	pub fn issue(&self, user_id: i64, roles: &[String]) -> Result<String, AuthError> {
		let signing = self.signing.as_ref().ok_or(AuthError::NoSigningKey)?;

		let claims = Claims::new(format!("{user_id:x}"), roles.to_vec(), self.validity);
		let payload = serde_json::to_vec(&claims).map_err(|_| AuthError::Malformed)?;
		let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

		let sig = signing
			.try_sign(payload_b64.as_bytes())
			.map_err(|_| AuthError::BadSignature)?;
		Ok(format!("{RSA_TAG}.{payload_b64}.{}", URL_SAFE_NO_PAD.encode(sig.to_bytes())))
	}

	/// Verify signature integrity and expiry. Fails closed on any
	/// structural error.
	pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
		let (payload_b64, sig_b64) = split_token(token, RSA_TAG)?;

		let sig_bytes = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| AuthError::Malformed)?;
		let sig = Signature::try_from(sig_bytes.as_slice()).map_err(|_| AuthError::Malformed)?;
		self.verifying
			.verify(payload_b64.as_bytes(), &sig)
			.map_err(|_| AuthError::BadSignature)?;

		decode_claims(payload_b64)
	}

	/// Parse the hex-encoded numeric subject of a verified token.
	pub fn subject_id(claims: &Claims) -> Result<i64, AuthError> {
		i64::from_str_radix(&claims.sub, 16).map_err(|_| AuthError::Malformed)
	}
}

/// Both schemes bundled behind one verification entry point; the caller
/// names the scheme, the codec never tries both on one token.
pub struct TokenCodec {
	hmac: HmacScheme,
	rsa: RsaScheme,
}

impl TokenCodec {
	pub fn new(hmac: HmacScheme, rsa: RsaScheme) -> Self {
		Self { hmac, rsa }
	}

	pub fn verify(&self, scheme: TokenScheme, token: &str) -> Result<Claims, AuthError> {
		match scheme {
			TokenScheme::LegacyHmac => self.hmac.verify(token),
			TokenScheme::Rsa => self.rsa.verify(token),
		}
	}

	pub fn issue(&self, user_id: i64, roles: &[String]) -> Result<String, AuthError> {
		self.rsa.issue(user_id, roles)
	}

	/// Deprecated issuing path, kept only for the migration window.
	pub fn issue_legacy(&self, username: &str, roles: &[String]) -> Result<String, AuthError> {
		self.hmac.issue(username, roles)
	}
}

fn split_token<'t>(token: &'t str, tag: &str) -> Result<(&'t str, &'t str), AuthError> {
	let parts = token.split('.').collect::<Vec<_>>();
	if parts.len() != 3 || parts[0] != tag {
		return Err(AuthError::Malformed);
	}
	Ok((parts[1], parts[2]))
}

fn decode_claims(payload_b64: &str) -> Result<Claims, AuthError> {
	let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| AuthError::Malformed)?;
	let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;
	if claims.is_expired(unix_now()) {
		return Err(AuthError::Expired);
	}
	Ok(claims)
}

fn hmac_sign(payload_b64: &[u8], secret: &[u8]) -> Result<Vec<u8>, AuthError> {
	let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| AuthError::Malformed)?;
	mac.update(payload_b64);
	Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}

	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}

	diff == 0
}
