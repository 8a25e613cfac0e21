#![forbid(unsafe_code)]

use std::sync::Arc;

use deskchat_auth::CallerContext;
use deskchat_domain::{Address, ChatEvent, Identity, InboundMessage, Queue};
use tracing::{debug, warn};

use crate::server::delivery::{Outbound, Registry};
use crate::server::store::ConversationStore;

/// Sender identity and display name of the seeded welcome event.
pub const WELCOME_SENDER: &str = "admin";
pub const WELCOME_DISPLAY: &str = "Virtual Bot";

/// Settings for the message router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
	/// Greeting text seeded into a conversation on first join.
	pub welcome_message: String,

	pub debug_log_events: bool,
}

impl Default for RouterConfig {
	fn default() -> Self {
		Self {
			welcome_message: "Hi! I'm the deskchat virtual assistant. I can help you find answers to common questions.\n\
				What can I help you with today?"
				.to_string(),
			debug_log_events: false,
		}
	}
}

/// Routes each inbound chat event to the right conversation and
/// recipient connection(s).
///
/// There is no state machine across events; every address is handled as
/// an independent transition over the conversation store and the
/// registry. Any handler fault is absorbed here: the event is dropped
/// with a log and a counter, the connection is never torn down, and no
/// error is echoed to the sender outside of `room.errors`.
pub struct MessageRouter {
	store: Arc<ConversationStore>,
	registry: Arc<dyn Registry>,
	cfg: RouterConfig,
	welcome_sender: Identity,
}

impl MessageRouter {
	pub fn new(store: Arc<ConversationStore>, registry: Arc<dyn Registry>, cfg: RouterConfig) -> Self {
		let welcome_sender = Identity::new(WELCOME_SENDER).expect("welcome sender identity");
		Self {
			store,
			registry,
			cfg,
			welcome_sender,
		}
	}

	/// Handle one inbound event stamped with the caller's verified
	/// identity and role.
	pub fn dispatch(&self, ctx: &CallerContext, address: Address, payload: &serde_json::Value) {
		metrics::counter!("deskchat_router_events_total").increment(1);

		let msg: InboundMessage = match serde_json::from_value(payload.clone()) {
			Ok(msg) => msg,
			Err(err) => {
				warn!(address = %address, error = %err, "malformed event payload dropped");
				metrics::counter!("deskchat_router_dropped_total").increment(1);
				return;
			}
		};

		if self.cfg.debug_log_events {
			debug!(
				address = %address,
				caller = %ctx.identity,
				role = %ctx.role,
				target = %msg.target,
				"routing inbound event"
			);
		}

		match address {
			Address::Chat => self.handle_chat(ctx, msg),
			Address::ChatHistory => self.handle_chat_history(ctx, msg),
			Address::JoinHistory => self.handle_join_history(ctx, msg),
			Address::Typing => self.handle_typing(ctx, msg),
			Address::Join => self.handle_join(ctx, msg),
			Address::ErrorReport => self.handle_error_report(ctx, msg),
		}
	}

	/// The conversation a non-privileged caller may touch is always its
	/// own verified identity; only privileged callers address arbitrary
	/// customer identities. The payload target is never trusted for the
	/// key otherwise.
	fn conversation_key(&self, ctx: &CallerContext, msg: &InboundMessage) -> Identity {
		if ctx.role.is_privileged() {
			msg.target.clone()
		} else {
			ctx.identity.clone()
		}
	}

	fn handle_chat(&self, ctx: &CallerContext, msg: InboundMessage) {
		let key = self.conversation_key(ctx, &msg);
		let event = ChatEvent::now(msg.sender_id.clone(), ctx.display_name.clone(), msg.content);

		// Tolerant append: a conversation only exists once joined.
		self.store.append(&key, event.clone());

		self.registry.send(&msg.target, Outbound::new(Queue::Chat, event));
	}

	fn handle_chat_history(&self, ctx: &CallerContext, msg: InboundMessage) {
		let key = self.conversation_key(ctx, &msg);

		let Some(events) = self.store.history(&key) else {
			debug!(conversation = %key, "history requested for unknown conversation");
			metrics::counter!("deskchat_router_dropped_total").increment(1);
			return;
		};

		// Replayed to the requester's own channel, one stored event per
		// delivery, in stored order. The channel is registered under the
		// verified identity, so the payload sender id is not used here; a
		// guest never knows its server-assigned identity.
		for event in events {
			self.registry.send(&ctx.identity, Outbound::new(Queue::History, event));
		}
	}

	fn handle_join_history(&self, ctx: &CallerContext, _msg: InboundMessage) {
		if !ctx.role.is_privileged() {
			debug!(caller = %ctx.identity, role = %ctx.role, "join history denied (not privileged)");
			metrics::counter!("deskchat_router_denied_total").increment(1);
			return;
		}

		for identity in self.store.customer_identities() {
			let display = identity.display_label();
			let entry = ChatEvent::now(identity, display, String::new());
			self.registry.send(&ctx.identity, Outbound::new(Queue::Join, entry));
		}
	}

	fn handle_typing(&self, _ctx: &CallerContext, msg: InboundMessage) {
		// Passthrough; no conversation is resolved or mutated.
		let event = ChatEvent::now(msg.sender_id.clone(), String::new(), msg.content);
		self.registry.send(&msg.target, Outbound::new(Queue::Typing, event));
	}

	fn handle_join(&self, ctx: &CallerContext, msg: InboundMessage) {
		let key = self.conversation_key(ctx, &msg);

		// The seeded welcome is not pushed to the joining connection; it
		// becomes visible only through a later history read.
		self.store.ensure_seeded(&key, || {
			ChatEvent::now(
				self.welcome_sender.clone(),
				WELCOME_DISPLAY,
				self.cfg.welcome_message.clone(),
			)
		});

		let event = ChatEvent::now(msg.sender_id.clone(), ctx.display_name.clone(), msg.content);
		self.registry.send(&msg.target, Outbound::new(Queue::Join, event));
	}

	fn handle_error_report(&self, _ctx: &CallerContext, msg: InboundMessage) {
		// The one sanctioned path for surfacing client-visible errors.
		let event = ChatEvent::now(msg.sender_id.clone(), String::new(), msg.content);
		self.registry.send(&msg.target, Outbound::new(Queue::Error, event));
	}
}
