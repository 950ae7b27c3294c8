// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Correlation tracking core for reverse-proxy instrumentation.
//!
//! The proxy calls into this crate at three points of an exchange:
//!
//! ```text
//! inbound request ──▶ TransactionTracker::begin ──▶ Transaction
//!                                                     │
//!    outbound call ──▶ ExitCallRegistrar::record ─────┤ (0..n, token injected)
//!                        └─▶ ExitCall::finish / on_completion
//!                                                     │
//! inbound response ──▶ Transaction::end ◀─────────────┘
//! ```
//!
//! Reading the proxy's objects is delegated to an [`AttributeExtractor`],
//! reporting to a [`Reporter`]. Nothing in here panics or returns an error
//! into the request path: failures are logged and the exchange proceeds as if
//! it were not instrumented.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod attributes;
pub mod carrier;
pub mod config;
pub mod error;
pub mod exit_call;
pub mod logger;
pub mod reporter;
pub mod token;
pub mod transaction;

pub use attributes::{AttributeExtractor, RequestAttributes};
pub use config::Config;
pub use error::Error;
pub use exit_call::{ExitCall, ExitCallRegistrar, ExitCallState, TargetProperties};
pub use reporter::{
    DataScope, EntryKind, EntryPoint, ExitCallHandle, ExitKind, Reporter, TransactionHandle,
};
pub use token::{CorrelationToken, CORRELATION_HEADER_KEY};
pub use transaction::{CallSite, Transaction, TransactionState, TransactionTracker};
