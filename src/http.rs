//! Transport primitives for the authenticated request pipeline.
//!
//! The module exposes [`HttpTransport`] as the crate's only dependency on an HTTP stack,
//! alongside the [`HttpCall`]/[`HttpReply`] value types the pipeline threads through it.
//! Callers provide an implementation (typically behind `Arc<T>` where `T: HttpTransport`);
//! the default [`ReqwestTransport`] is available behind the `reqwest` feature.

// std
use std::ops::Deref;
// self
use crate::{_prelude::*, error::TransportError};

/// Well-known header names used by the pipeline.
pub mod header {
	/// Credential-bearing header attached by the outbound stage.
	pub const AUTHORIZATION: &str = "Authorization";
	/// Media type header set when a JSON body is attached.
	pub const CONTENT_TYPE: &str = "Content-Type";
}

/// Boxed future returned by [`HttpTransport`] implementations.
pub type TransportFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of dispatching pipeline requests.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can back both the
/// refresher and the request pipeline without additional wrappers, and the futures they
/// return must own whatever state they need so in-flight operations remain `Send`.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches a single request and resolves with the raw reply.
	///
	/// Transport-level failures (DNS, TCP, TLS) surface as [`TransportError`]; HTTP error
	/// statuses are not failures at this layer and come back as ordinary replies.
	fn dispatch(&self, call: HttpCall) -> TransportFuture<'_, HttpReply>;
}

/// HTTP methods the pipeline dispatches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// GET request.
	Get,
	/// POST request.
	Post,
	/// PUT request.
	Put,
	/// PATCH request.
	Patch,
	/// DELETE request.
	Delete,
}
impl Method {
	/// Returns the canonical wire name of the method.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A single outbound request as the pipeline sees it.
#[derive(Clone)]
pub struct HttpCall {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Header name/value pairs; names are matched case-insensitively.
	pub headers: Vec<(String, String)>,
	/// Optional raw request body.
	pub body: Option<Vec<u8>>,
}
impl HttpCall {
	/// Builds a bodiless request for the provided method and URL.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: Vec::new(), body: None }
	}

	/// Convenience constructor for GET requests.
	pub fn get(url: Url) -> Self {
		Self::new(Method::Get, url)
	}

	/// Convenience constructor for POST requests.
	pub fn post(url: Url) -> Self {
		Self::new(Method::Post, url)
	}

	/// Appends a header without replacing existing values.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Attaches a JSON body and the matching content type header.
	pub fn with_json(mut self, value: serde_json::Value) -> Self {
		self.body = Some(value.to_string().into_bytes());
		self.set_header(header::CONTENT_TYPE, "application/json");

		self
	}

	/// Sets `name` to `value`, replacing any existing occurrence (case-insensitive).
	pub fn set_header(&mut self, name: &str, value: &str) {
		self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
		self.headers.push((name.into(), value.into()));
	}

	/// Returns the first value stored under `name` (case-insensitive), if any.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(existing, _)| existing.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}
impl Debug for HttpCall {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers: Vec<_> = self
			.headers
			.iter()
			.map(|(name, value)| {
				if name.eq_ignore_ascii_case(header::AUTHORIZATION) {
					(name.as_str(), "<redacted>")
				} else {
					(name.as_str(), value.as_str())
				}
			})
			.collect();

		f.debug_struct("HttpCall")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}

/// A raw reply as returned by the transport.
#[derive(Clone, Debug)]
pub struct HttpReply {
	/// HTTP status code.
	pub status: u16,
	/// Response header name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpReply {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Deserializes the body as JSON.
	pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
		serde_json::from_slice(&self.body)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Both the refresher and the request pipeline dispatch through the same transport value, so
/// connection pools are shared across the whole authenticated surface.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn dispatch(&self, call: HttpCall) -> TransportFuture<'_, HttpReply> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match call.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut request = client.request(method, call.url);

			for (name, value) in &call.headers {
				request = request.header(name, value);
			}
			if let Some(body) = call.body {
				request = request.body(body);
			}

			let response = request.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
				})
				.collect();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(HttpReply { status, headers, body })
		})
	}
}
