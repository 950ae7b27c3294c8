// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for correlation tracking.
//!
//! None of these errors ever leave the public operations of this crate: the
//! tracker and registrar log them and carry on, so that instrumentation can
//! never fail a proxied request. They exist so that collaborators (extractors,
//! reporters, carriers) have a typed way to say what went wrong.
//!
//! # Handling
//!
//! - **Extraction**: logged at warn, the attribute is treated as absent
//! - **Injection**: logged at warn, the outbound call proceeds without the header
//! - **Reporter**: logged at error, the affected transaction or exit call is skipped
//! - **Protocol anomaly**: logged, the operation is a no-op

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Reading an attribute from the proxied request or response failed.
    #[error("Cannot extract {attribute}: {message}")]
    Extraction {
        attribute: &'static str,
        message: String,
    },

    /// Writing a header onto an outbound carrier failed.
    #[error("Cannot inject {header}: {message}")]
    Injection { header: String, message: String },

    /// The host agent rejected an operation.
    #[error("Reporter failed to {operation}: {message}")]
    Reporter {
        operation: &'static str,
        message: String,
    },

    /// A lifecycle step happened without the state it depends on.
    #[error("Protocol anomaly: {0}")]
    ProtocolAnomaly(&'static str),
}

impl Error {
    #[must_use]
    pub fn extract(attribute: &'static str, message: impl Into<String>) -> Self {
        Self::Extraction {
            attribute,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn inject(header: &str, message: impl Into<String>) -> Self {
        Self::Injection {
            header: header.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn reporter(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Reporter {
            operation,
            message: message.into(),
        }
    }
}
