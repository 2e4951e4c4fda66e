//! Durable key-value contracts and built-in store implementations for session state.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Well-known keys the session layer uses inside the durable store.
pub mod keys {
	/// Bearer token value.
	pub const TOKEN: &str = "token";
	/// Expiry instant as an RFC 3339 UTC timestamp string.
	pub const EXPIRE: &str = "expire";
	/// Optional project context forwarded on refresh calls.
	pub const PROJECT: &str = "project";
}

/// Synchronous durable key-value contract for session state.
///
/// Models a browser-local storage surface: reads and writes are synchronous and infallible so
/// they can run inside the pipeline's check-then-act windows without introducing suspension
/// points. Backends that persist asynchronously (such as [`FileStore`]) keep their in-memory
/// view authoritative and treat persistence as best effort.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Returns the value stored under `key`, if present.
	fn get(&self, key: &str) -> Option<String>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set(&self, key: &str, value: &str);

	/// Removes the value stored under `key`, if present.
	fn remove(&self, key: &str);

	/// Wipes the store entirely. Must be idempotent and must not fail.
	fn clear(&self);
}

/// Error type produced while opening or loading a store backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_can_be_serialized() {
		let payload = serde_json::to_string(&StoreError::Backend { message: "disk full".into() })
			.expect("StoreError should serialize to JSON.");
		let round_trip: StoreError = serde_json::from_str(&payload)
			.expect("Serialized store error should deserialize from JSON.");

		assert_eq!(round_trip, StoreError::Backend { message: "disk full".into() });
	}
}
