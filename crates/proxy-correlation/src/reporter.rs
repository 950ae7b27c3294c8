// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reporter boundary: the host agent's transaction API.
//!
//! The core decides *when* transactions and exit calls open and close; the
//! reporter decides what that means on the wire. Implementations must be
//! thread-safe, and must tolerate an exit call being closed after the
//! transaction that opened it.

use std::sync::Arc;

use serde::Serialize;

use crate::attributes::RequestAttributes;
use crate::error::Error;
use crate::exit_call::TargetProperties;
use crate::token::CorrelationToken;

/// How an inbound call entered the proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Arrived over the network, has a URL and a method.
    Network,
    /// Dispatched internally (a rule or policy hook).
    Internal,
}

/// How an outbound call is rendered by the reporter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    /// Keyed by URL.
    Network,
    /// Keyed by host, used when no URL could be built.
    Generic,
}

/// Where a custom attribute is made visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    Snapshots,
    Analytics,
}

/// Description of an inbound call handed to the reporter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    pub name: String,
    pub kind: EntryKind,
    /// Present for network entries only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestAttributes>,
}

pub trait Reporter: Send + Sync {
    /// Starts a brand new transaction.
    fn originate_transaction(&self, entry: &EntryPoint)
        -> Result<Arc<dyn TransactionHandle>, Error>;

    /// Starts a transaction continuing the one identified by `token`.
    fn continue_transaction(
        &self,
        token: &CorrelationToken,
        entry: &EntryPoint,
    ) -> Result<Arc<dyn TransactionHandle>, Error>;
}

pub trait TransactionHandle: Send + Sync {
    fn unique_id(&self) -> String;

    fn attach_attribute(&self, key: &str, value: &str, scopes: &[DataScope]) -> Result<(), Error>;

    fn mark_error(&self, description: &str) -> Result<(), Error>;

    fn open_exit_call(
        &self,
        target: &TargetProperties,
        key: &str,
        kind: ExitKind,
    ) -> Result<Box<dyn ExitCallHandle>, Error>;

    fn close(&self) -> Result<(), Error>;
}

pub trait ExitCallHandle: Send + Sync {
    /// Token to propagate to the backend so it can continue the transaction.
    fn correlation_token(&self) -> Option<CorrelationToken>;

    fn close(&self) -> Result<(), Error>;
}
