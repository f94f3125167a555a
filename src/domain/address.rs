//! Validated upstream address of a managed connection.

use std::fmt;
use std::str::FromStr;

use axum::http::Uri;
use serde::Serialize;

use crate::error::ConnectionError;

/// Absolute `ws://` or `wss://` URI a managed connection is opened against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Validates `raw` as a WebSocket address.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::MissingAddress`] when `raw` is empty or blank.
    /// - [`ConnectionError::InvalidAddress`] when `raw` is not an absolute
    ///   URI with a host.
    /// - [`ConnectionError::UnsupportedScheme`] when the scheme is neither
    ///   `ws` nor `wss`.
    pub fn parse(raw: &str) -> Result<Self, ConnectionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConnectionError::MissingAddress);
        }

        let uri: Uri = trimmed
            .parse()
            .map_err(|err: axum::http::uri::InvalidUri| ConnectionError::InvalidAddress {
                address: trimmed.to_string(),
                reason: err.to_string(),
            })?;

        match uri.scheme_str() {
            Some("ws" | "wss") => {}
            Some(other) => return Err(ConnectionError::UnsupportedScheme(other.to_string())),
            None => {
                return Err(ConnectionError::InvalidAddress {
                    address: trimmed.to_string(),
                    reason: "missing scheme".to_string(),
                });
            }
        }

        if uri.host().is_none_or(str::is_empty) {
            return Err(ConnectionError::InvalidAddress {
                address: trimmed.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Returns the address as written by the caller (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ws_and_wss() {
        assert!(Address::parse("ws://localhost:5173/").is_ok());
        assert!(Address::parse("wss://example.com/hmr?token=1").is_ok());
    }

    #[test]
    fn blank_is_missing() {
        assert_eq!(Address::parse("  "), Err(ConnectionError::MissingAddress));
    }

    #[test]
    fn http_scheme_rejected() {
        let Err(ConnectionError::UnsupportedScheme(scheme)) = Address::parse("http://localhost")
        else {
            panic!("expected unsupported scheme");
        };
        assert_eq!(scheme, "http");
    }

    #[test]
    fn relative_path_rejected() {
        assert!(matches!(
            Address::parse("/socket"),
            Err(ConnectionError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn keeps_trimmed_text() {
        let Ok(address) = Address::parse(" ws://127.0.0.1:24678 ") else {
            panic!("valid address");
        };
        assert_eq!(address.as_str(), "ws://127.0.0.1:24678");
    }
}
