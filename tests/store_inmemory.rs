// std
use std::sync::Arc;
// self
use session_guard::store::{MemoryStore, SessionStore, keys};

#[test]
fn set_and_get_round_trip() {
	let store = MemoryStore::default();

	assert_eq!(store.get(keys::TOKEN), None);

	store.set(keys::TOKEN, "abc");
	store.set(keys::EXPIRE, "2025-06-01T12:00:00Z");

	assert_eq!(store.get(keys::TOKEN).as_deref(), Some("abc"));
	assert_eq!(store.get(keys::EXPIRE).as_deref(), Some("2025-06-01T12:00:00Z"));
}

#[test]
fn set_replaces_previous_values() {
	let store = MemoryStore::default();

	store.set(keys::TOKEN, "abc");
	store.set(keys::TOKEN, "xyz");

	assert_eq!(store.get(keys::TOKEN).as_deref(), Some("xyz"));
}

#[test]
fn remove_only_touches_the_named_key() {
	let store = MemoryStore::default();

	store.set(keys::TOKEN, "abc");
	store.set(keys::PROJECT, "7");
	store.remove(keys::TOKEN);
	store.remove(keys::TOKEN);

	assert_eq!(store.get(keys::TOKEN), None);
	assert_eq!(store.get(keys::PROJECT).as_deref(), Some("7"));
}

#[test]
fn clear_wipes_everything_and_is_idempotent() {
	let store = MemoryStore::default();

	store.set(keys::TOKEN, "abc");
	store.set(keys::EXPIRE, "2025-06-01T12:00:00Z");
	store.set(keys::PROJECT, "7");

	store.clear();
	store.clear();

	assert_eq!(store.get(keys::TOKEN), None);
	assert_eq!(store.get(keys::EXPIRE), None);
	assert_eq!(store.get(keys::PROJECT), None);
}

#[test]
fn clones_share_the_same_backing_state() {
	let store = Arc::new(MemoryStore::default());
	let view = store.clone();

	store.set(keys::TOKEN, "abc");

	assert_eq!(view.get(keys::TOKEN).as_deref(), Some("abc"));

	view.clear();

	assert_eq!(store.get(keys::TOKEN), None);
}
