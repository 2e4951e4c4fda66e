//! Authenticated request pipeline: outbound credential attach, inbound retry-once recovery.
//!
//! [`ApiClient`] wraps a transport so every outbound call carries a valid bearer credential
//! and every authentication failure gets exactly one coordinated recovery attempt. The
//! outbound stage attaches the stored token, rotating it preemptively when it is about to
//! expire; the inbound stage reacts to a 401 by refreshing and resubmitting the original
//! request once. When recovery is impossible the session is torn down and the navigator is
//! pointed at the login surface, while the caller still receives a settled error.

// self
use crate::{
	_prelude::*,
	http::{HttpCall, HttpReply, HttpTransport, header},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::SessionManager,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestTransport, store::SessionStore};

/// Status code treated as an authentication failure by the inbound stage.
const STATUS_UNAUTHENTICATED: u16 = 401;

/// Login-surface navigation sink used when recovery is impossible.
pub trait Navigator
where
	Self: Send + Sync,
{
	/// Performs a full client-side navigation to `route`, replacing the current history entry
	/// so the broken session is not left in back-history.
	fn replace(&self, route: &str);
}

/// Navigator that records redirects instead of performing them, for tests and headless
/// embedders.
#[derive(Debug, Default)]
pub struct RecordingNavigator(Mutex<Vec<String>>);
impl RecordingNavigator {
	/// Returns the routes navigated to so far, in order.
	pub fn routes(&self) -> Vec<String> {
		self.0.lock().clone()
	}

	/// Returns the number of redirects performed.
	pub fn redirects(&self) -> usize {
		self.0.lock().len()
	}
}
impl Navigator for RecordingNavigator {
	fn replace(&self, route: &str) {
		self.0.lock().push(route.into());
	}
}

/// Explicit retry-state wrapper threaded through the pipeline.
///
/// The flag lives on the attempt, not on shared state, so one request's retry can never bleed
/// into another's, and a resubmission is structurally limited to happening once.
struct RequestAttempt {
	request: HttpCall,
	retried: bool,
}
impl RequestAttempt {
	fn new(request: HttpCall) -> Self {
		Self { request, retried: false }
	}
}

#[cfg(feature = "reqwest")]
/// API client specialized for the crate's default reqwest transport stack.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Composes the outbound and inbound interceptor stages around a transport.
///
/// All consumers issue requests exclusively through [`ApiClient::execute`]; none of them
/// manage credentials directly. The session manager is injected so the single-flight refresh
/// contract holds across every client sharing it.
pub struct ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	session: SessionManager<C>,
	transport: Arc<C>,
	navigator: Arc<dyn Navigator>,
	login_route: String,
}
impl<C> ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	/// Default application route representing the login surface.
	pub const DEFAULT_LOGIN_ROUTE: &'static str = "/login";

	/// Creates a client around the caller-provided session manager, transport, and navigator.
	pub fn with_transport(
		session: SessionManager<C>,
		transport: impl Into<Arc<C>>,
		navigator: Arc<dyn Navigator>,
	) -> Self {
		Self {
			session,
			transport: transport.into(),
			navigator,
			login_route: Self::DEFAULT_LOGIN_ROUTE.into(),
		}
	}

	/// Overrides the login route navigated to on unrecoverable auth failure.
	pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
		self.login_route = route.into();

		self
	}

	/// Returns the session manager backing this client.
	pub fn session(&self) -> &SessionManager<C> {
		&self.session
	}

	/// Dispatches a request through both interceptor stages.
	///
	/// Replies that are not authentication failures come back unchanged, whatever their
	/// status. A 401 is retried exactly once after a coordinated refresh; a second 401, or a
	/// failed refresh, surfaces as an error. The returned future always settles, even when a
	/// login redirect was triggered on the way.
	pub async fn execute(&self, call: HttpCall) -> Result<HttpReply> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "execute");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.execute_attempt(RequestAttempt::new(call))).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn execute_attempt(&self, mut attempt: RequestAttempt) -> Result<HttpReply> {
		loop {
			let prepared = self.authorize(attempt.request.clone()).await;
			let reply = self.transport.dispatch(prepared).await?;

			if reply.status != STATUS_UNAUTHENTICATED {
				return Ok(reply);
			}
			if attempt.retried {
				return Err(Error::Unauthenticated { status: reply.status });
			}

			attempt.retried = true;

			if let Err(err) = self.session.refresh().await {
				// Recovery is impossible; end the session and hand the user to the login
				// surface. The caller still gets a settled error, not an unwound stack.
				self.session.clear_session();
				self.navigator.replace(&self.login_route);

				return Err(err.into());
			}

			// The resubmission goes back through the full pipeline once, now carrying the
			// rotated credential.
		}
	}

	/// Outbound stage: attach the stored credential, rotating it first when it is stale.
	async fn authorize(&self, mut call: HttpCall) -> HttpCall {
		let Some(token) = self.session.token() else {
			// Unauthenticated sends are allowed; the backend's 401 drives recovery.
			return call;
		};

		if !self.session.will_expire_soon() {
			call.set_header(header::AUTHORIZATION, &bearer(&token));

			return call;
		}

		// Preemptive rotation is best effort only; the response-side retry is the
		// authoritative recovery path and must not be short-circuited from here.
		match self.session.refresh().await {
			Ok(rotated) => call.set_header(header::AUTHORIZATION, &bearer(rotated.token.expose())),
			Err(err) => obs::log_swallowed("preemptive_refresh", &err),
		}

		call
	}
}
impl<C> Clone for ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			session: self.session.clone(),
			transport: self.transport.clone(),
			navigator: self.navigator.clone(),
			login_route: self.login_route.clone(),
		}
	}
}
impl<C> Debug for ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("session", &self.session)
			.field("login_route", &self.login_route)
			.finish()
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client that provisions its own reqwest-backed transport, shared between the
	/// session manager and the request pipeline.
	pub fn new(
		store: Arc<dyn SessionStore>,
		refresh_url: Url,
		navigator: Arc<dyn Navigator>,
	) -> Self {
		let transport = ReqwestTransport::default();
		let session = SessionManager::with_transport(store, refresh_url, transport.clone());

		Self::with_transport(session, transport, navigator)
	}
}

fn bearer(token: &str) -> String {
	format!("Bearer {token}")
}
