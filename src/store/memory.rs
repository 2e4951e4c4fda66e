//! Thread-safe in-memory [`SessionStore`] implementation for local development and tests.

// self
use crate::{_prelude::*, store::SessionStore};

/// Thread-safe storage backend that keeps session state in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<String, String>>>);
impl SessionStore for MemoryStore {
	fn get(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	fn set(&self, key: &str, value: &str) {
		self.0.write().insert(key.into(), value.into());
	}

	fn remove(&self, key: &str) {
		self.0.write().remove(key);
	}

	fn clear(&self) {
		self.0.write().clear();
	}
}
