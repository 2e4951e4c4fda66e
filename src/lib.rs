//! Single-flight session refresh and retry-once authentication pipeline for dashboard API
//! clients: one credential, many concurrent requests, exactly one refresh call in flight.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod error;
pub mod http;
pub mod obs;
pub mod pipeline;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		http::ReqwestTransport,
		pipeline::{ApiClient, RecordingNavigator},
		session::SessionManager,
		store::{MemoryStore, SessionStore},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ApiClient<ReqwestTransport>;

	/// Constructs an [`ApiClient`] backed by an in-memory store, a recording navigator, and the
	/// reqwest transport used across integration tests.
	///
	/// Returns the store and navigator backends so tests can seed credentials and assert on
	/// redirects.
	pub fn build_reqwest_test_client(
		refresh_url: Url,
	) -> (ReqwestTestClient, Arc<MemoryStore>, Arc<RecordingNavigator>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn SessionStore> = store_backend.clone();
		let navigator = Arc::new(RecordingNavigator::default());
		let transport = ReqwestTransport::default();
		let session = SessionManager::with_transport(store, refresh_url, transport.clone());
		let client = ApiClient::with_transport(session, transport, navigator.clone());

		(client, store_backend, navigator)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
