//! Credential types: the bearer token secret, its expiry, and the staleness policy.

// crates.io
use time::{error::Parse as TimeParseError, format_description::well_known::Rfc3339};
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// The unit of authentication state: a bearer token plus its UTC expiry instant.
///
/// The pair is persisted under two independent store keys; a [`Credential`] value only exists
/// when both are present.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	/// Bearer token attached to outbound requests.
	pub token: TokenSecret,
	/// Expiry instant, always interpreted in UTC.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Remaining lifetime at or below which a credential is considered stale and worth
	/// refreshing before use.
	pub const STALE_THRESHOLD: Duration = Duration::minutes(5);

	/// Builds a credential from a raw token value and an expiry instant.
	pub fn new(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { token: TokenSecret::new(token), expires_at }
	}

	/// Parses an expiry timestamp as transmitted by the token endpoint (RFC 3339).
	pub fn parse_expiry(raw: &str) -> Result<OffsetDateTime, TimeParseError> {
		OffsetDateTime::parse(raw, &Rfc3339)
	}

	/// Returns `true` if the remaining lifetime at `now` is within [`Self::STALE_THRESHOLD`].
	pub fn will_expire_soon_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at - now <= Self::STALE_THRESHOLD
	}

	/// Convenience helper that checks staleness against the current UTC instant.
	pub fn will_expire_soon(&self) -> bool {
		self.will_expire_soon_at(OffsetDateTime::now_utc())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &self.token)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
