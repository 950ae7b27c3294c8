// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Correlation token handling.
//!
//! A correlation token links an inbound request to the transaction that
//! produced it upstream. Its presence decides between continuing an existing
//! transaction and originating a new one, so an absent token and a malformed
//! one are folded into the same `None`.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, warn};

use crate::carrier::{Extractor, Injector};
use crate::error::Error;

/// Header carrying the correlation token across process boundaries.
pub const CORRELATION_HEADER_KEY: &str = "singularityheader";

/// Opaque identifier threading a transaction across services.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Validates a raw header value.
    ///
    /// Surrounding whitespace is trimmed. Empty values and values containing
    /// control characters are rejected.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::extract("correlation token", "empty value"));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(Error::extract(
                "correlation token",
                "value contains control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CorrelationToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CorrelationToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the correlation token stored under `header`.
///
/// Returns `None` when the header is absent or its value is malformed.
pub fn extract_token(carrier: &dyn Extractor, header: &str) -> Option<CorrelationToken> {
    let raw = carrier.get(header)?;
    match CorrelationToken::parse(raw) {
        Ok(token) => {
            debug!("Read correlation header {header}={token}");
            Some(token)
        }
        Err(e) => {
            debug!("Ignoring malformed correlation header {header}: {e}");
            None
        }
    }
}

/// Writes `token` under `header`, replacing any previous value.
///
/// Failures are logged and swallowed: a missing header degrades correlation
/// but must never fail the outbound call. Returns whether the header was set.
pub fn inject_token(carrier: &mut dyn Injector, header: &str, token: &CorrelationToken) -> bool {
    match carrier.set(header, token.to_string()) {
        Ok(()) => {
            debug!("Added correlation header {header}={token}");
            true
        }
        Err(e) => {
            warn!("Problem injecting correlation header into exit call: {e}");
            false
        }
    }
}
