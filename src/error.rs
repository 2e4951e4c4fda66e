//! Crate-level error types shared across the session refresher and request pipeline.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Token refresh failure.
	#[error(transparent)]
	Refresh(#[from] RefreshError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Backend rejected the request as unauthenticated and the single retry was already used.
	#[error("Backend rejected the request as unauthenticated (HTTP {status}).")]
	Unauthenticated {
		/// HTTP status code reported by the backend.
		status: u16,
	},
}

/// Failures raised by the credential refresher.
///
/// String payloads keep the enum cloneable so queued single-flight callers can observe the
/// same outcome.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// Refresh attempted with nothing to refresh.
	#[error("No credential is stored; nothing to refresh.")]
	NoCredential,
	/// Token endpoint responded 2xx without the required fields, or with a body that could not
	/// be parsed.
	#[error("Token endpoint returned a malformed response: {reason}.")]
	InvalidResponse {
		/// Human-readable description of what was missing or unparseable.
		reason: String,
	},
	/// Token endpoint rejected the refresh exchange.
	#[error("Token endpoint rejected the refresh (HTTP {status}).")]
	Rejected {
		/// HTTP status code returned by the token endpoint.
		status: u16,
	},
	/// Network-level failure calling the token endpoint.
	#[error("Network error occurred while calling the token endpoint: {message}.")]
	Transport {
		/// Transport-specific failure description.
		message: String,
	},
}

/// Transport-level failures (network, IO) raised while dispatching wrapped requests.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while dispatching the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while dispatching the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_with_source() {
		let store_error = StoreError::Backend { message: "snapshot unwritable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("snapshot unwritable"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn refresh_error_outcomes_are_cloneable() {
		let original = RefreshError::Rejected { status: 502 };

		assert_eq!(original.clone(), original);
	}
}
