//! Credential store & refresher with single-flight coordination.
//!
//! [`SessionManager`] owns the durable credential pair (token + expiry) and the policy for
//! rotating it. Any number of concurrent callers may request a refresh; a per-manager guard
//! plus a re-read of the token observed at entry guarantee that at most one
//! `POST /upgrade_token` exchange is in flight at any instant. Callers queued behind an
//! in-flight exchange share its outcome: the rotated credential on success, or an empty
//! session (and [`RefreshError::NoCredential`]) after a failure tore it down. The guard is
//! released on drop, so no error or panic can leave the manager believing a refresh is still
//! pending.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::RefreshError,
	http::{HttpCall, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{SessionStore, keys},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Session manager specialized for the crate's default reqwest transport.
pub type ReqwestSessionManager = SessionManager<ReqwestTransport>;

/// Wire shape of a token upgrade response. Both fields are required on success; anything
/// less is treated as a malformed response.
#[derive(Debug, Deserialize)]
struct UpgradeReply {
	token: Option<String>,
	expire: Option<String>,
}

/// Coordinates the credential lifecycle against a single refresh endpoint.
///
/// The manager holds the durable store, the transport, and the single-flight state so the
/// request pipeline can stay free of credential policy. Refresh failures are not retried
/// here; the pipeline owns the retry-once policy.
pub struct SessionManager<C>
where
	C: ?Sized + HttpTransport,
{
	/// Shared metrics recorder for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	store: Arc<dyn SessionStore>,
	transport: Arc<C>,
	refresh_url: Url,
	refresh_guard: Arc<AsyncMutex<()>>,
}
impl<C> SessionManager<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a manager that reuses the caller-provided transport.
	pub fn with_transport(
		store: Arc<dyn SessionStore>,
		refresh_url: Url,
		transport: impl Into<Arc<C>>,
	) -> Self {
		Self {
			refresh_metrics: Default::default(),
			store,
			transport: transport.into(),
			refresh_url,
			refresh_guard: Default::default(),
		}
	}

	/// Returns the stored bearer token, if any. Pure store read; never performs I/O.
	pub fn token(&self) -> Option<String> {
		self.store.get(keys::TOKEN)
	}

	/// Returns the stored expiry instant.
	///
	/// A missing or unparseable expiry yields `None`; the pipeline then proceeds optimistically
	/// and relies on the response-side retry as the safety net.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		let raw = self.store.get(keys::EXPIRE)?;

		Credential::parse_expiry(&raw).ok()
	}

	/// Returns the composite credential when both the token and a parseable expiry are stored.
	pub fn credential(&self) -> Option<Credential> {
		Some(Credential::new(self.token()?, self.expires_at()?))
	}

	/// Returns the project context forwarded on refresh calls, read fresh from the store.
	///
	/// Non-numeric values are ignored rather than failing the refresh.
	pub fn project_context(&self) -> Option<i64> {
		self.store.get(keys::PROJECT)?.trim().parse().ok()
	}

	/// Returns `true` if the stored credential's remaining lifetime at `now` is within
	/// [`Credential::STALE_THRESHOLD`]. No stored expiry counts as "not expiring."
	pub fn will_expire_soon_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at().is_some_and(|at| at - now <= Credential::STALE_THRESHOLD)
	}

	/// Convenience helper that checks staleness against the current UTC instant.
	pub fn will_expire_soon(&self) -> bool {
		self.will_expire_soon_at(OffsetDateTime::now_utc())
	}

	/// Wipes all session state. Idempotent; never fails.
	pub fn clear_session(&self) {
		self.store.clear();
		obs::debug_event("session_cleared");
	}

	/// Exchanges the stored credential for a fresh one, single-flighting concurrent callers.
	///
	/// Any failure other than [`RefreshError::NoCredential`] tears the session down before it
	/// is returned. See the module docs for the coordination contract.
	pub async fn refresh(&self) -> Result<Credential, RefreshError> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_locked()).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn refresh_locked(&self) -> Result<Credential, RefreshError> {
		self.refresh_metrics.record_attempt();

		// Read before the first suspension point so a rotation that lands while this caller
		// waits for the guard is detectable afterwards.
		let observed = match self.token() {
			Some(token) => token,
			None => {
				self.refresh_metrics.record_failure();

				return Err(RefreshError::NoCredential);
			},
		};
		let _singleflight = self.refresh_guard.lock().await;

		match self.token() {
			// The refresh this caller queued behind failed and tore the session down.
			None => {
				self.refresh_metrics.record_failure();

				return Err(RefreshError::NoCredential);
			},
			Some(current) if current != observed =>
				if let Some(rotated) = self.credential() {
					self.refresh_metrics.record_reuse();
					self.refresh_metrics.record_success();

					return Ok(rotated);
				},
			Some(_) => {},
		}

		// Read fresh at refresh time, never cached alongside the credential.
		let project = self.project_context();
		let reply = match self.transport.dispatch(self.upgrade_call(project)).await {
			Ok(reply) => reply,
			Err(err) => return Err(self.fail(RefreshError::Transport { message: err.to_string() })),
		};

		if !reply.is_success() {
			return Err(self.fail(RefreshError::Rejected { status: reply.status }));
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&reply.body);
		let parsed: UpgradeReply = match serde_path_to_error::deserialize(&mut deserializer) {
			Ok(parsed) => parsed,
			Err(err) =>
				return Err(self.fail(RefreshError::InvalidResponse { reason: err.to_string() })),
		};
		let (Some(token), Some(expire)) = (parsed.token, parsed.expire) else {
			return Err(self.fail(RefreshError::InvalidResponse {
				reason: "both `token` and `expire` are required".into(),
			}));
		};
		let expires_at = match Credential::parse_expiry(&expire) {
			Ok(instant) => instant,
			Err(err) =>
				return Err(self.fail(RefreshError::InvalidResponse {
					reason: format!("`expire` is not a valid RFC 3339 timestamp: {err}"),
				})),
		};

		// Persist as a pair with no suspension point in between; a reader never observes one
		// key rotated without the other.
		self.store.set(keys::TOKEN, &token);
		self.store.set(keys::EXPIRE, &expire);

		self.refresh_metrics.record_success();

		Ok(Credential::new(token, expires_at))
	}

	/// Hard refresh failures end the session; the pipeline decides whether to redirect.
	fn fail(&self, err: RefreshError) -> RefreshError {
		self.clear_session();
		self.refresh_metrics.record_failure();

		err
	}

	fn upgrade_call(&self, project: Option<i64>) -> HttpCall {
		let call = HttpCall::post(self.refresh_url.clone());

		match project {
			Some(project_id) =>
				call.with_json(serde_json::json!({ "project_id": project_id })),
			None => call,
		}
	}
}
impl<C> Clone for SessionManager<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			refresh_metrics: self.refresh_metrics.clone(),
			store: self.store.clone(),
			transport: self.transport.clone(),
			refresh_url: self.refresh_url.clone(),
			refresh_guard: self.refresh_guard.clone(),
		}
	}
}
impl<C> Debug for SessionManager<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("refresh_url", &self.refresh_url.as_str())
			.field("token_set", &self.token().is_some())
			.finish()
	}
}
#[cfg(feature = "reqwest")]
impl SessionManager<ReqwestTransport> {
	/// Creates a manager that provisions its own reqwest-backed transport.
	pub fn new(store: Arc<dyn SessionStore>, refresh_url: Url) -> Self {
		Self::with_transport(store, refresh_url, ReqwestTransport::default())
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use time::format_description::well_known::Rfc3339;
	// self
	use super::*;
	use crate::{
		http::{HttpReply, TransportFuture},
		store::MemoryStore,
	};

	struct ScriptedEndpoint {
		calls: AtomicUsize,
		last_call: Mutex<Option<HttpCall>>,
		status: u16,
		body: String,
	}
	impl ScriptedEndpoint {
		fn new(status: u16, body: impl Into<String>) -> Arc<Self> {
			Arc::new(Self {
				calls: AtomicUsize::new(0),
				last_call: Mutex::new(None),
				status,
				body: body.into(),
			})
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		fn last_call(&self) -> Option<HttpCall> {
			self.last_call.lock().clone()
		}
	}
	impl HttpTransport for ScriptedEndpoint {
		fn dispatch(&self, call: HttpCall) -> TransportFuture<'_, HttpReply> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);
				*self.last_call.lock() = Some(call);

				// Suspend once so concurrent callers reach the guard while this exchange is
				// in flight.
				tokio::task::yield_now().await;

				Ok(HttpReply {
					status: self.status,
					headers: Vec::new(),
					body: self.body.clone().into_bytes(),
				})
			})
		}
	}

	fn rfc3339_in(delta: Duration) -> String {
		(OffsetDateTime::now_utc() + delta)
			.format(&Rfc3339)
			.expect("Expiry fixture should format as RFC 3339.")
	}

	fn rotated_body(expire_in: Duration) -> String {
		format!(r#"{{"token":"rotated","expire":"{}"}}"#, rfc3339_in(expire_in))
	}

	fn manager(
		endpoint: Arc<ScriptedEndpoint>,
	) -> (SessionManager<ScriptedEndpoint>, Arc<MemoryStore>) {
		let backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn SessionStore> = backend.clone();
		let url = Url::parse("https://api.example.com/upgrade_token")
			.expect("Refresh endpoint fixture should parse.");

		(SessionManager::with_transport(store, url, endpoint), backend)
	}

	fn seed(store: &MemoryStore, token: &str, expire_in: Duration) {
		store.set(keys::TOKEN, token);
		store.set(keys::EXPIRE, &rfc3339_in(expire_in));
	}

	#[tokio::test]
	async fn concurrent_refreshes_share_a_single_exchange() {
		let endpoint = ScriptedEndpoint::new(200, rotated_body(Duration::hours(1)));
		let (session, store) = manager(endpoint.clone());

		seed(&store, "stale", Duration::minutes(2));

		let (a, b, c) = tokio::join!(session.refresh(), session.refresh(), session.refresh());
		let a = a.expect("First concurrent refresh should succeed.");
		let b = b.expect("Second concurrent refresh should share the outcome.");
		let c = c.expect("Third concurrent refresh should share the outcome.");

		assert_eq!(endpoint.calls(), 1);
		assert_eq!(a.token.expose(), "rotated");
		assert_eq!(b.token.expose(), "rotated");
		assert_eq!(c.token.expose(), "rotated");
		assert_eq!(session.refresh_metrics.reuses(), 2);
		assert_eq!(session.refresh_metrics.successes(), 3);
	}

	#[tokio::test]
	async fn refresh_persists_the_rotated_pair() {
		let expire = rfc3339_in(Duration::hours(1));
		let endpoint =
			ScriptedEndpoint::new(200, format!(r#"{{"token":"rotated","expire":"{expire}"}}"#));
		let (session, store) = manager(endpoint);

		seed(&store, "stale", Duration::minutes(2));

		let credential = session.refresh().await.expect("Refresh should succeed.");

		assert_eq!(credential.token.expose(), "rotated");
		assert_eq!(store.get(keys::TOKEN).as_deref(), Some("rotated"));
		assert_eq!(store.get(keys::EXPIRE).as_deref(), Some(expire.as_str()));
		assert!(session.credential().is_some());
	}

	#[tokio::test]
	async fn refresh_forwards_the_project_context() {
		let endpoint = ScriptedEndpoint::new(200, rotated_body(Duration::hours(1)));
		let (session, store) = manager(endpoint.clone());

		seed(&store, "stale", Duration::minutes(2));
		store.set(keys::PROJECT, "42");

		session.refresh().await.expect("Refresh with project context should succeed.");

		let call = endpoint.last_call().expect("Upgrade exchange should have been dispatched.");

		assert_eq!(call.body.as_deref(), Some(br#"{"project_id":42}"#.as_slice()));
	}

	#[tokio::test]
	async fn refresh_rejection_tears_down_the_session() {
		let endpoint = ScriptedEndpoint::new(500, "");
		let (session, store) = manager(endpoint.clone());

		seed(&store, "stale", Duration::minutes(2));

		let err = session.refresh().await.expect_err("Rejected refresh should fail.");

		assert_eq!(err, RefreshError::Rejected { status: 500 });
		assert_eq!(session.token(), None);
		assert!(!session.will_expire_soon());
		assert_eq!(store.get(keys::PROJECT), None);

		// With the session gone there is nothing left to refresh, and no second exchange.
		let err = session.refresh().await.expect_err("Follow-up refresh should fail.");

		assert_eq!(err, RefreshError::NoCredential);
		assert_eq!(endpoint.calls(), 1);
	}

	#[tokio::test]
	async fn malformed_reply_is_invalid_and_tears_down() {
		let endpoint = ScriptedEndpoint::new(200, r#"{"token":"rotated"}"#);
		let (session, store) = manager(endpoint);

		seed(&store, "stale", Duration::minutes(2));

		let err = session.refresh().await.expect_err("Reply without expire should fail.");

		assert!(matches!(err, RefreshError::InvalidResponse { .. }));
		assert_eq!(store.get(keys::TOKEN), None);
	}

	#[tokio::test]
	async fn unparseable_expiry_in_reply_is_invalid() {
		let endpoint =
			ScriptedEndpoint::new(200, r#"{"token":"rotated","expire":"next tuesday"}"#);
		let (session, store) = manager(endpoint);

		seed(&store, "stale", Duration::minutes(2));

		let err = session.refresh().await.expect_err("Unparseable expiry should fail.");

		assert!(matches!(err, RefreshError::InvalidResponse { .. }));
		assert_eq!(store.get(keys::TOKEN), None);
	}

	#[tokio::test]
	async fn refresh_without_credential_short_circuits() {
		let endpoint = ScriptedEndpoint::new(200, rotated_body(Duration::hours(1)));
		let (session, _store) = manager(endpoint.clone());

		let err = session.refresh().await.expect_err("Refresh with empty store should fail.");

		assert_eq!(err, RefreshError::NoCredential);
		assert_eq!(endpoint.calls(), 0);
	}

	#[tokio::test]
	async fn missing_expiry_counts_as_not_expiring() {
		let endpoint = ScriptedEndpoint::new(200, "");
		let (session, store) = manager(endpoint);

		store.set(keys::TOKEN, "abc");

		assert!(!session.will_expire_soon());
		assert_eq!(session.token().as_deref(), Some("abc"));
		assert_eq!(session.credential(), None);
	}

	#[tokio::test]
	async fn malformed_stored_expiry_is_treated_as_missing() {
		let endpoint = ScriptedEndpoint::new(200, "");
		let (session, store) = manager(endpoint);

		store.set(keys::TOKEN, "abc");
		store.set(keys::EXPIRE, "not-a-timestamp");

		assert_eq!(session.expires_at(), None);
		assert!(!session.will_expire_soon());
		assert_eq!(session.credential(), None);
	}

	#[tokio::test]
	async fn project_context_ignores_non_numeric_values() {
		let endpoint = ScriptedEndpoint::new(200, "");
		let (session, store) = manager(endpoint);

		assert_eq!(session.project_context(), None);

		store.set(keys::PROJECT, "42");

		assert_eq!(session.project_context(), Some(42));

		store.set(keys::PROJECT, "acme");

		assert_eq!(session.project_context(), None);
	}

	#[tokio::test]
	async fn teardown_is_idempotent() {
		let endpoint = ScriptedEndpoint::new(200, "");
		let (session, store) = manager(endpoint);

		seed(&store, "abc", Duration::minutes(10));

		session.clear_session();
		session.clear_session();

		assert_eq!(session.token(), None);
		assert!(!session.will_expire_soon());
	}
}
