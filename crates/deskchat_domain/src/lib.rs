#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identities, roles, and addresses from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty value")]
	Empty,
	#[error("unknown role authority: {0}")]
	UnknownRole(String),
	#[error("unknown address: {0}")]
	UnknownAddress(String),
}

/// Opaque caller identity; the conversation key on the customer side.
///
/// Two flavors share one type: registered identities (a username, stable
/// across sessions) and guest identities (derived from the transport
/// session id, stable only for that connection). Guest identities carry
/// a reserved prefix so routing and display logic can branch on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Identity(String);

impl Identity {
	/// Reserved prefix for guest identities.
	pub const GUEST_PREFIX: &'static str = "Guest";

	/// Create a non-empty `Identity`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseError::Empty);
		}
		Ok(Self(id))
	}

	/// Derive the guest identity for a transport session id.
	pub fn guest(session_id: &str) -> Self {
		Self(format!("{}{}", Self::GUEST_PREFIX, session_id))
	}

	pub fn is_guest(&self) -> bool {
		self.0.starts_with(Self::GUEST_PREFIX)
	}

	/// The transport-session suffix of a guest identity, if this is one.
	pub fn guest_suffix(&self) -> Option<&str> {
		self.0.strip_prefix(Self::GUEST_PREFIX)
	}

	/// Directory rendering: `Guest #<suffix>` for guests, verbatim otherwise.
	pub fn display_label(&self) -> String {
		match self.guest_suffix() {
			Some(suffix) => format!("Guest #{suffix}"),
			None => self.0.clone(),
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for Identity {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Identity::new(s.to_string())
	}
}

impl TryFrom<String> for Identity {
	type Error = ParseError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Identity::new(value)
	}
}

/// Closed set of caller roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Admin,
	Agent,
	Customer,
	Guest,
}

impl Role {
	/// Authority string as carried in token role claims.
	pub const fn authority(self) -> &'static str {
		match self {
			Role::Admin => "ROLE_ADMIN",
			Role::Agent => "ROLE_AGENT",
			Role::Customer => "ROLE_CUSTOMER",
			Role::Guest => "ROLE_GUEST",
		}
	}

	/// Parse an authority string; the `ROLE_` prefix is optional.
	///
	/// Returns `None` for anything unrecognized so callers fail toward
	/// least privilege.
	pub fn from_authority(s: &str) -> Option<Self> {
		let s = s.trim();
		let name = s.strip_prefix("ROLE_").unwrap_or(s);
		match name.to_ascii_uppercase().as_str() {
			"ADMIN" => Some(Role::Admin),
			"AGENT" => Some(Role::Agent),
			"CUSTOMER" => Some(Role::Customer),
			"GUEST" => Some(Role::Guest),
			_ => None,
		}
	}

	/// Whether this role may address conversations by arbitrary customer
	/// identity. The single role gate; handlers never compare strings.
	pub const fn is_privileged(self) -> bool {
		matches!(self, Role::Admin)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Role::Admin => "admin",
			Role::Agent => "agent",
			Role::Customer => "customer",
			Role::Guest => "guest",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.trim().is_empty() {
			return Err(ParseError::Empty);
		}
		Role::from_authority(s).ok_or_else(|| ParseError::UnknownRole(s.to_string()))
	}
}

/// A chat event in delivered form, as appended to conversation logs and
/// pushed to recipient queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
	pub sender_id: Identity,
	pub sender_display_name: String,
	pub content: String,
	#[serde(rename = "timestamp")]
	pub sent_at: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub conversation_tag: Option<String>,
}

impl ChatEvent {
	/// Build an event stamped with the current time and no tag.
	pub fn now(sender_id: Identity, sender_display_name: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			sender_id,
			sender_display_name: sender_display_name.into(),
			content: content.into(),
			sent_at: Utc::now(),
			conversation_tag: None,
		}
	}
}

/// Inbound chat payload as supplied by the caller.
///
/// `target` is reconciled against the caller's verified role before it
/// ever influences a conversation key; it is not trusted at face value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
	#[serde(alias = "message")]
	pub content: String,
	pub sender_id: Identity,
	#[serde(rename = "receiverUsername")]
	pub target: Identity,
}

/// Inbound transport addresses the router is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
	Chat,
	ChatHistory,
	JoinHistory,
	Typing,
	Join,
	ErrorReport,
}

impl Address {
	pub const fn as_str(self) -> &'static str {
		match self {
			Address::Chat => "room.chat",
			Address::ChatHistory => "room.chat.history",
			Address::JoinHistory => "room.join.history",
			Address::Typing => "room.update",
			Address::Join => "room.join",
			Address::ErrorReport => "room.errors",
		}
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Address {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseError::Empty);
		}
		match s {
			"room.chat" => Ok(Address::Chat),
			"room.chat.history" => Ok(Address::ChatHistory),
			"room.join.history" => Ok(Address::JoinHistory),
			"room.update" => Ok(Address::Typing),
			"room.join" => Ok(Address::Join),
			"room.errors" => Ok(Address::ErrorReport),
			other => Err(ParseError::UnknownAddress(other.to_string())),
		}
	}
}

/// Per-user delivery queues events are pushed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Queue {
	#[serde(rename = "queue.chat")]
	Chat,
	#[serde(rename = "queue.load")]
	History,
	#[serde(rename = "queue.join")]
	Join,
	#[serde(rename = "queue.update")]
	Typing,
	#[serde(rename = "queue.error")]
	Error,
}

impl Queue {
	pub const fn as_str(self) -> &'static str {
		match self {
			Queue::Chat => "queue.chat",
			Queue::History => "queue.load",
			Queue::Join => "queue.join",
			Queue::Typing => "queue.update",
			Queue::Error => "queue.error",
		}
	}
}

impl fmt::Display for Queue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn guest_identity_prefix_and_label() {
		let g = Identity::guest("a1b2");
		assert!(g.is_guest());
		assert_eq!(g.as_str(), "Guesta1b2");
		assert_eq!(g.guest_suffix(), Some("a1b2"));
		assert_eq!(g.display_label(), "Guest #a1b2");

		let u = Identity::new("alice").unwrap();
		assert!(!u.is_guest());
		assert_eq!(u.display_label(), "alice");
	}

	#[test]
	fn rejects_empty_identity() {
		assert!(Identity::new("").is_err());
		assert!(Identity::new("   ").is_err());
		assert!("".parse::<Identity>().is_err());
	}

	#[test]
	fn rejects_empty_identity_on_the_wire() {
		assert!(serde_json::from_str::<Identity>(r#""""#).is_err());
		assert!(serde_json::from_str::<Identity>(r#""   ""#).is_err());

		let msg: Result<InboundMessage, _> =
			serde_json::from_str(r#"{"message":"hi","senderId":"","receiverUsername":"bob"}"#);
		assert!(msg.is_err());
		let msg: Result<InboundMessage, _> =
			serde_json::from_str(r#"{"message":"hi","senderId":"alice","receiverUsername":""}"#);
		assert!(msg.is_err());
	}

	#[test]
	fn role_authority_roundtrip() {
		assert_eq!(Role::from_authority("ROLE_ADMIN"), Some(Role::Admin));
		assert_eq!(Role::from_authority("agent"), Some(Role::Agent));
		assert_eq!(Role::Admin.authority(), "ROLE_ADMIN");
		assert_eq!("ROLE_CUSTOMER".parse::<Role>().unwrap(), Role::Customer);
	}

	#[test]
	fn unknown_authority_is_never_privileged() {
		assert_eq!(Role::from_authority("ROLE_SUPERUSER"), None);
		assert_eq!(Role::from_authority(""), None);
		assert!(!Role::Agent.is_privileged());
		assert!(!Role::Guest.is_privileged());
		assert!(Role::Admin.is_privileged());
	}

	#[test]
	fn address_parse_roundtrip() {
		for addr in [
			Address::Chat,
			Address::ChatHistory,
			Address::JoinHistory,
			Address::Typing,
			Address::Join,
			Address::ErrorReport,
		] {
			assert_eq!(addr.as_str().parse::<Address>().unwrap(), addr);
		}
		assert!("room.unknown".parse::<Address>().is_err());
	}

	#[test]
	fn inbound_accepts_message_alias() {
		let msg: InboundMessage =
			serde_json::from_str(r#"{"message":"hi","senderId":"alice","receiverUsername":"bob"}"#).unwrap();
		assert_eq!(msg.content, "hi");
		assert_eq!(msg.sender_id.as_str(), "alice");
		assert_eq!(msg.target.as_str(), "bob");

		let missing: Result<InboundMessage, _> = serde_json::from_str(r#"{"message":"hi"}"#);
		assert!(missing.is_err());
	}

	#[test]
	fn chat_event_wire_shape() {
		let ev = ChatEvent::now(Identity::new("alice").unwrap(), "Alice", "hello");
		let json = serde_json::to_value(&ev).unwrap();
		assert_eq!(json["senderId"], "alice");
		assert_eq!(json["senderDisplayName"], "Alice");
		assert_eq!(json["content"], "hello");
		assert!(json.get("conversationTag").is_none());
	}
}
