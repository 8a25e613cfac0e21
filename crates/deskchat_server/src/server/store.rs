#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use deskchat_domain::{ChatEvent, Identity};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Number of independent shards; contention is scoped per customer
/// identity, never across the whole store.
const SHARD_COUNT: usize = 16;

/// In-memory registry of conversations keyed by customer identity.
///
/// Conversations are created lazily on first join and never evicted for
/// the life of the process. Nothing here blocks on I/O while a lock is
/// held; delivery happens after store mutations are released.
pub struct ConversationStore {
	shards: Vec<RwLock<HashMap<Identity, Arc<Conversation>>>>,
}

/// One customer's ordered, append-only event log.
pub struct Conversation {
	log: Mutex<Vec<ChatEvent>>,
}

impl Conversation {
	fn seeded(seed: ChatEvent) -> Self {
		Self {
			log: Mutex::new(vec![seed]),
		}
	}

	fn push(&self, event: ChatEvent) {
		self.log.lock().push(event);
	}

	fn snapshot(&self) -> Vec<ChatEvent> {
		self.log.lock().clone()
	}
}

impl ConversationStore {
	pub fn new() -> Self {
		Self {
			shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
		}
	}

	/// Create the conversation for `identity` if absent, seeding it with
	/// the event produced by `seed`. Returns whether this call created it.
	///
	/// Creation is atomic-once: the seed lands in the log under the shard
	/// write lock, so exactly one concurrent creator seeds and the seed is
	/// always the first event.
	pub fn ensure_seeded(&self, identity: &Identity, seed: impl FnOnce() -> ChatEvent) -> bool {
		let mut shard = self.shard(identity).write();
		if shard.contains_key(identity) {
			return false;
		}

		shard.insert(identity.clone(), Arc::new(Conversation::seeded(seed())));
		metrics::counter!("deskchat_store_conversations_created_total").increment(1);
		true
	}

	/// Append to an existing conversation.
	///
	/// Silently tolerates a missing conversation (returns `false`, logged
	/// and counted): only the join path creates conversations.
	pub fn append(&self, identity: &Identity, event: ChatEvent) -> bool {
		let conversation = {
			let shard = self.shard(identity).read();
			shard.get(identity).cloned()
		};

		match conversation {
			Some(c) => {
				c.push(event);
				true
			}
			None => {
				debug!(identity = %identity, "append to unknown conversation dropped");
				metrics::counter!("deskchat_store_append_missing_total").increment(1);
				false
			}
		}
	}

	/// Snapshot of the full history for `identity`, in append order.
	/// Later appends are not observed through the returned copy.
	pub fn history(&self, identity: &Identity) -> Option<Vec<ChatEvent>> {
		let conversation = {
			let shard = self.shard(identity).read();
			shard.get(identity).cloned()
		};

		conversation.map(|c| c.snapshot())
	}

	/// Sorted snapshot of every known customer identity. Admin-facing
	/// directory listing only.
	pub fn customer_identities(&self) -> Vec<Identity> {
		let mut out = Vec::new();
		for shard in &self.shards {
			out.extend(shard.read().keys().cloned());
		}
		out.sort();
		out
	}

	pub fn conversation_count(&self) -> usize {
		self.shards.iter().map(|s| s.read().len()).sum()
	}

	fn shard(&self, identity: &Identity) -> &RwLock<HashMap<Identity, Arc<Conversation>>> {
		let mut hasher = DefaultHasher::new();
		identity.hash(&mut hasher);
		&self.shards[(hasher.finish() as usize) % SHARD_COUNT]
	}
}

impl Default for ConversationStore {
	fn default() -> Self {
		Self::new()
	}
}
