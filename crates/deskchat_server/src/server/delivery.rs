#![forbid(unsafe_code)]

use std::collections::HashMap;

use deskchat_domain::{ChatEvent, Identity, Queue};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// A routed event addressed to one per-user delivery queue.
#[derive(Debug, Clone, Serialize)]
pub struct Outbound {
	pub queue: Queue,
	pub event: ChatEvent,
}

impl Outbound {
	pub fn new(queue: Queue, event: ChatEvent) -> Self {
		Self { queue, event }
	}
}

/// The `send(identity, event)` capability the router routes through.
///
/// Delivery is best-effort: an unknown identity is a silent no-op from
/// the router's point of view.
pub trait Registry: Send + Sync {
	fn send(&self, target: &Identity, item: Outbound);
}

/// Configuration for `DeliveryHub`.
#[derive(Debug, Clone)]
pub struct DeliveryHubConfig {
	/// Maximum number of queued items per connection.
	pub queue_capacity: usize,

	pub debug_logs: bool,
}

impl Default for DeliveryHubConfig {
	fn default() -> Self {
		Self {
			queue_capacity: 256,
			debug_logs: false,
		}
	}
}

/// Maps logical identities to their live delivery channels.
///
/// One identity may hold several connections; every live channel gets a
/// copy. Full or closed channels drop items rather than block or tear
/// anything down.
pub struct DeliveryHub {
	inner: Mutex<Inner>,
	cfg: DeliveryHubConfig,
}

#[derive(Default)]
struct Inner {
	conns: HashMap<Identity, Vec<mpsc::Sender<Outbound>>>,
}

impl DeliveryHub {
	pub fn new(cfg: DeliveryHubConfig) -> Self {
		Self {
			inner: Mutex::new(Inner::default()),
			cfg,
		}
	}

	/// Register a live connection for `identity`.
	pub fn register(&self, identity: Identity) -> mpsc::Receiver<Outbound> {
		let (tx, rx) = mpsc::channel(self.cfg.queue_capacity);

		let mut inner = self.inner.lock();
		let entry = inner.conns.entry(identity.clone()).or_default();
		prune_closed_senders(entry);
		entry.push(tx);

		if self.cfg.debug_logs {
			debug!(identity = %identity, conns = entry.len(), "delivery hub: registered");
		}

		rx
	}

	/// Live connection count for an identity.
	pub fn connection_count(&self, identity: &Identity) -> usize {
		let inner = self.inner.lock();
		inner
			.conns
			.get(identity)
			.map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
			.unwrap_or(0)
	}
}

impl Registry for DeliveryHub {
	fn send(&self, target: &Identity, item: Outbound) {
		let mut inner = self.inner.lock();
		let Some(entry) = inner.conns.get_mut(target) else {
			metrics::counter!("deskchat_delivery_unknown_target_total").increment(1);
			if self.cfg.debug_logs {
				debug!(target = %target, queue = %item.queue, "delivery hub: unknown target, dropped");
			}
			return;
		};

		prune_closed_senders(entry);
		if entry.is_empty() {
			inner.conns.remove(target);
			metrics::counter!("deskchat_delivery_unknown_target_total").increment(1);
			return;
		}

		let mut dropped: u64 = 0;
		for sender in entry.iter() {
			match sender.try_send(item.clone()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
				Err(mpsc::error::TrySendError::Closed(_)) => {}
			}
		}

		prune_closed_senders(entry);
		if entry.is_empty() {
			inner.conns.remove(target);
		}

		if dropped > 0 {
			metrics::counter!("deskchat_delivery_dropped_total").increment(dropped);
			if self.cfg.debug_logs {
				debug!(target = %target, dropped, "delivery hub: dropped due to full connection queues");
			}
		}
	}
}

fn prune_closed_senders(senders: &mut Vec<mpsc::Sender<Outbound>>) {
	senders.retain(|s| !s.is_closed());
}
