#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use deskchat_domain::{ChatEvent, Identity};

use crate::server::store::ConversationStore;

fn id(s: &str) -> Identity {
	Identity::new(s).expect("valid identity")
}

fn ev(sender: &str, content: &str) -> ChatEvent {
	ChatEvent::now(id(sender), sender.to_string(), content)
}

#[test]
fn concurrent_ensure_creates_exactly_once() {
	let store = Arc::new(ConversationStore::new());
	let target = id("Guest42");
	let seeds = Arc::new(AtomicUsize::new(0));
	let creations = Arc::new(AtomicUsize::new(0));

	std::thread::scope(|scope| {
		for _ in 0..32 {
			let store = Arc::clone(&store);
			let target = target.clone();
			let seeds = Arc::clone(&seeds);
			let creations = Arc::clone(&creations);
			scope.spawn(move || {
				let created = store.ensure_seeded(&target, || {
					seeds.fetch_add(1, Ordering::SeqCst);
					ev("admin", "welcome")
				});
				if created {
					creations.fetch_add(1, Ordering::SeqCst);
				}
			});
		}
	});

	assert_eq!(creations.load(Ordering::SeqCst), 1);
	assert_eq!(seeds.load(Ordering::SeqCst), 1);
	assert_eq!(store.conversation_count(), 1);

	let history = store.history(&target).expect("conversation exists");
	assert_eq!(history.len(), 1);
	assert_eq!(history[0].content, "welcome");
}

#[test]
fn history_preserves_append_order() {
	let store = ConversationStore::new();
	let target = id("carol");

	assert!(store.ensure_seeded(&target, || ev("admin", "welcome")));
	for i in 0..10 {
		assert!(store.append(&target, ev("carol", &format!("m{i}"))));
	}

	let history = store.history(&target).expect("conversation exists");
	assert_eq!(history.len(), 11);
	assert_eq!(history[0].content, "welcome");
	for (i, event) in history.iter().skip(1).enumerate() {
		assert_eq!(event.content, format!("m{i}"));
	}
}

#[test]
fn append_to_missing_conversation_is_a_tolerated_noop() {
	let store = ConversationStore::new();
	assert!(!store.append(&id("nobody"), ev("nobody", "hello")));
	assert_eq!(store.conversation_count(), 0);
	assert!(store.history(&id("nobody")).is_none());
}

#[test]
fn history_snapshot_ignores_later_appends() {
	let store = ConversationStore::new();
	let target = id("carol");

	store.ensure_seeded(&target, || ev("admin", "welcome"));
	let snapshot = store.history(&target).expect("conversation exists");

	store.append(&target, ev("carol", "later"));

	assert_eq!(snapshot.len(), 1);
	assert_eq!(store.history(&target).expect("conversation exists").len(), 2);
}

#[test]
fn customer_identities_are_sorted_and_complete() {
	let store = ConversationStore::new();
	for name in ["zoe", "Guest42", "carol"] {
		store.ensure_seeded(&id(name), || ev("admin", "welcome"));
	}

	let identities = store.customer_identities();
	let names = identities.iter().map(Identity::as_str).collect::<Vec<_>>();
	assert_eq!(names, vec!["Guest42", "carol", "zoe"]);
}
