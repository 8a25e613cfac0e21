#![forbid(unsafe_code)]

use std::sync::Arc;

use deskchat_auth::CallerContext;
use deskchat_domain::{Address, Identity, Queue, Role};
use parking_lot::Mutex;

use crate::server::delivery::{Outbound, Registry};
use crate::server::router::{MessageRouter, RouterConfig, WELCOME_SENDER};
use crate::server::store::ConversationStore;

/// Registry stub that records every delivery attempt.
#[derive(Default)]
struct RecordingRegistry {
	sent: Mutex<Vec<(Identity, Outbound)>>,
}

impl RecordingRegistry {
	fn sends(&self) -> Vec<(Identity, Outbound)> {
		self.sent.lock().clone()
	}
}

impl Registry for RecordingRegistry {
	fn send(&self, target: &Identity, item: Outbound) {
		self.sent.lock().push((target.clone(), item));
	}
}

struct Fixture {
	store: Arc<ConversationStore>,
	registry: Arc<RecordingRegistry>,
	router: MessageRouter,
}

fn fixture() -> Fixture {
	let store = Arc::new(ConversationStore::new());
	let registry = Arc::new(RecordingRegistry::default());
	let router = MessageRouter::new(
		Arc::clone(&store),
		Arc::clone(&registry) as Arc<dyn Registry>,
		RouterConfig::default(),
	);
	Fixture { store, registry, router }
}

fn id(s: &str) -> Identity {
	Identity::new(s).expect("valid identity")
}

fn guest_ctx(session: &str) -> CallerContext {
	CallerContext {
		identity: Identity::guest(session),
		role: Role::Guest,
		display_name: format!("Guest #{session}"),
		session_id: session.to_string(),
	}
}

fn admin_ctx() -> CallerContext {
	CallerContext {
		identity: id("admin"),
		role: Role::Admin,
		display_name: "admin".to_string(),
		session_id: "admin-session".to_string(),
	}
}

fn customer_ctx(name: &str) -> CallerContext {
	CallerContext {
		identity: id(name),
		role: Role::Customer,
		display_name: name.to_string(),
		session_id: format!("{name}-session"),
	}
}

fn payload(content: &str, sender: &str, target: &str) -> serde_json::Value {
	serde_json::json!({
		"message": content,
		"senderId": sender,
		"receiverUsername": target,
	})
}

#[test]
fn join_seeds_welcome_once_and_notifies_target() {
	let f = fixture();
	let ctx = guest_ctx("42");

	f.router
		.dispatch(&ctx, Address::Join, &payload("joined", "Guest42", "Guest42"));

	// Exactly one seeded welcome from the system sender, not pushed live.
	let history = f.store.history(&id("Guest42")).expect("conversation created");
	assert_eq!(history.len(), 1);
	assert_eq!(history[0].sender_id, id(WELCOME_SENDER));
	assert_eq!(history[0].sender_display_name, "Virtual Bot");

	let sends = f.registry.sends();
	assert_eq!(sends.len(), 1);
	assert_eq!(sends[0].0, id("Guest42"));
	assert_eq!(sends[0].1.queue, Queue::Join);
	assert_eq!(sends[0].1.event.content, "joined");
	assert_eq!(sends[0].1.event.sender_display_name, "Guest #42");

	// A second join must not reseed.
	f.router
		.dispatch(&ctx, Address::Join, &payload("rejoined", "Guest42", "Guest42"));
	assert_eq!(f.store.history(&id("Guest42")).expect("exists").len(), 1);
}

#[test]
fn history_replays_welcome_then_messages_in_order() {
	let f = fixture();
	let ctx = guest_ctx("42");

	f.router
		.dispatch(&ctx, Address::Join, &payload("joined", "Guest42", "Guest42"));
	f.router.dispatch(&ctx, Address::Chat, &payload("one", "Guest42", "admin"));
	f.router.dispatch(&ctx, Address::Chat, &payload("two", "Guest42", "admin"));

	f.registry.sent.lock().clear();
	f.router
		.dispatch(&ctx, Address::ChatHistory, &payload("", "Guest42", "Guest42"));

	let sends = f.registry.sends();
	assert_eq!(sends.len(), 3);
	for (target, out) in &sends {
		assert_eq!(*target, id("Guest42"));
		assert_eq!(out.queue, Queue::History);
	}
	assert_eq!(sends[0].1.event.sender_id, id(WELCOME_SENDER));
	assert_eq!(sends[1].1.event.content, "one");
	assert_eq!(sends[2].1.event.content, "two");
}

#[test]
fn history_replay_targets_verified_caller_identity() {
	let f = fixture();
	let ctx = guest_ctx("a1b2c3d4");

	// The client never learns its server-assigned guest identity, so the
	// payload ids it supplies differ from the registered one. Replay must
	// still reach the channel registered under the verified identity.
	f.router
		.dispatch(&ctx, Address::Join, &payload("joined", "guest-42", "guest-42"));
	f.router.dispatch(&ctx, Address::Chat, &payload("hello", "guest-42", "admin"));

	f.registry.sent.lock().clear();
	f.router
		.dispatch(&ctx, Address::ChatHistory, &payload("", "guest-42", "guest-42"));

	let sends = f.registry.sends();
	assert_eq!(sends.len(), 2);
	for (target, out) in &sends {
		assert_eq!(*target, ctx.identity);
		assert_eq!(out.queue, Queue::History);
	}
	assert_eq!(sends[1].1.event.content, "hello");
}

#[test]
fn non_admin_chat_never_writes_a_foreign_conversation() {
	let f = fixture();
	let carol = customer_ctx("carol");
	let victim = id("Guest99");

	f.store.ensure_seeded(&victim, || {
		deskchat_domain::ChatEvent::now(id("admin"), "Virtual Bot", "welcome")
	});
	f.router.dispatch(&carol, Address::Join, &payload("hi", "carol", "carol"));

	// Target field points at someone else's conversation.
	f.router
		.dispatch(&carol, Address::Chat, &payload("sneaky", "carol", "Guest99"));

	let victim_history = f.store.history(&victim).expect("exists");
	assert_eq!(victim_history.len(), 1, "foreign conversation must stay untouched");

	let own = f.store.history(&id("carol")).expect("exists");
	assert_eq!(own.last().expect("non-empty").content, "sneaky");

	// Delivery is still attempted to the supplied target only.
	let last = f.registry.sends().last().cloned().expect("a delivery");
	assert_eq!(last.0, id("Guest99"));
	assert_eq!(last.1.queue, Queue::Chat);
}

#[test]
fn admin_chat_addresses_arbitrary_conversation() {
	let f = fixture();
	let guest = guest_ctx("42");
	f.router
		.dispatch(&guest, Address::Join, &payload("joined", "Guest42", "Guest42"));

	f.registry.sent.lock().clear();
	f.router
		.dispatch(&admin_ctx(), Address::Chat, &payload("hello", "admin", "Guest42"));

	let history = f.store.history(&id("Guest42")).expect("exists");
	assert_eq!(history.len(), 2);
	assert_eq!(history[1].content, "hello");
	assert_eq!(history[1].sender_id, id("admin"));
	assert_eq!(history[1].sender_display_name, "admin");

	let sends = f.registry.sends();
	assert_eq!(sends.len(), 1);
	assert_eq!(sends[0].0, id("Guest42"));
}

#[test]
fn chat_without_conversation_is_delivered_but_not_stored() {
	let f = fixture();

	f.router
		.dispatch(&customer_ctx("carol"), Address::Chat, &payload("hi", "carol", "admin"));

	assert!(f.store.history(&id("carol")).is_none());
	assert_eq!(f.registry.sends().len(), 1);
}

#[test]
fn join_history_is_admin_only_directory() {
	let f = fixture();
	f.router
		.dispatch(&guest_ctx("42"), Address::Join, &payload("hi", "Guest42", "Guest42"));
	f.router
		.dispatch(&customer_ctx("carol"), Address::Join, &payload("hi", "carol", "carol"));

	// Silently a no-op for non-privileged callers.
	f.registry.sent.lock().clear();
	f.router
		.dispatch(&customer_ctx("carol"), Address::JoinHistory, &payload("", "carol", "carol"));
	assert!(f.registry.sends().is_empty());

	f.router
		.dispatch(&admin_ctx(), Address::JoinHistory, &payload("", "admin", "admin"));

	let sends = f.registry.sends();
	assert_eq!(sends.len(), 2);

	let mut labels = sends
		.iter()
		.map(|(target, out)| {
			assert_eq!(*target, id("admin"));
			assert_eq!(out.queue, Queue::Join);
			out.event.sender_display_name.clone()
		})
		.collect::<Vec<_>>();
	labels.sort();
	assert_eq!(labels, vec!["Guest #42".to_string(), "carol".to_string()]);
}

#[test]
fn typing_update_is_passthrough_without_store_mutation() {
	let f = fixture();
	f.router
		.dispatch(&guest_ctx("42"), Address::Join, &payload("hi", "Guest42", "Guest42"));
	let before = f.store.history(&id("Guest42")).expect("exists").len();

	f.router
		.dispatch(&guest_ctx("42"), Address::Typing, &payload("typing...", "Guest42", "admin"));

	assert_eq!(f.store.conversation_count(), 1);
	assert_eq!(f.store.history(&id("Guest42")).expect("exists").len(), before);

	let last = f.registry.sends().last().cloned().expect("a delivery");
	assert_eq!(last.0, id("admin"));
	assert_eq!(last.1.queue, Queue::Typing);
	assert_eq!(last.1.event.content, "typing...");
}

#[test]
fn error_report_is_forwarded_to_target() {
	let f = fixture();

	f.router.dispatch(
		&guest_ctx("42"),
		Address::ErrorReport,
		&payload("boom", "Guest42", "admin"),
	);

	let sends = f.registry.sends();
	assert_eq!(sends.len(), 1);
	assert_eq!(sends[0].0, id("admin"));
	assert_eq!(sends[0].1.queue, Queue::Error);
	assert_eq!(sends[0].1.event.content, "boom");
	assert_eq!(f.store.conversation_count(), 0);
}

#[test]
fn malformed_payload_is_dropped_quietly() {
	let f = fixture();

	f.router
		.dispatch(&guest_ctx("42"), Address::Chat, &serde_json::json!({"message": "hi"}));
	f.router.dispatch(&guest_ctx("42"), Address::Join, &serde_json::json!({}));
	// Empty identities fail payload validation, same drop path.
	f.router
		.dispatch(&guest_ctx("42"), Address::Chat, &payload("hi", "", "admin"));
	f.router
		.dispatch(&guest_ctx("42"), Address::Chat, &payload("hi", "Guest42", ""));

	assert!(f.registry.sends().is_empty());
	assert_eq!(f.store.conversation_count(), 0);
}
