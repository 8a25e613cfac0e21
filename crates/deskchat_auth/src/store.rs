#![forbid(unsafe_code)]

use async_trait::async_trait;
use deskchat_domain::Role;

/// External user record backing a registered identity.
#[derive(Debug, Clone)]
pub struct User {
	pub id: i64,
	pub username: String,
	pub password_hash: String,
	pub role: Role,
}

/// External user store consumed by the identity resolver.
#[async_trait]
pub trait UserStore: Send + Sync {
	async fn find_by_username(&self, username: &str) -> Option<User>;
	async fn find_by_id(&self, id: i64) -> Option<User>;
}

/// In-memory user store for bootstrap and tests.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
	users: Vec<User>,
}

impl MemoryUserStore {
	pub fn new(users: Vec<User>) -> Self {
		Self { users }
	}

	pub fn len(&self) -> usize {
		self.users.len()
	}

	pub fn is_empty(&self) -> bool {
		self.users.is_empty()
	}
}

#[async_trait]
impl UserStore for MemoryUserStore {
	async fn find_by_username(&self, username: &str) -> Option<User> {
		self.users.iter().find(|u| u.username == username).cloned()
	}

	async fn find_by_id(&self, id: i64) -> Option<User> {
		self.users.iter().find(|u| u.id == id).cloned()
	}
}
