// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Exit call registration and completion.
//!
//! An exit call is one outbound request made while a transaction is open. The
//! registrar opens it on the reporter, propagates the reporter's correlation
//! token onto the outbound headers, and hands back an [`ExitCall`] that must be
//! finished exactly once:
//!
//! - synchronously, with [`ExitCall::finish`] or [`ExitCall::finish_with`]
//! - asynchronously, by wrapping the outbound future with
//!   [`ExitCall::on_completion`]; the exit call ends when the future settles,
//!   on whichever thread polls it
//!
//! Finishing consumes the exit call. One that is dropped while still pending
//! is ended by its destructor, so a recorded exit call is never left open.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::attributes::{best_effort, build_url, AttributeExtractor, UNKNOWN_HOST};
use crate::carrier::Injector;
use crate::config::Config;
use crate::error::Error;
use crate::reporter::{ExitCallHandle, ExitKind, TransactionHandle};
use crate::token::{inject_token, CorrelationToken};
use crate::transaction::{report_error, Transaction, TransactionShared};

pub const UNKNOWN_PORT: &str = "UNKNOWN-PORT";
pub const UNKNOWN_URL: &str = "UNKNOWN-URL";

/// Error description reported when an awaited exit call is dropped before its
/// outbound future settles.
pub const CANCELLED: &str = "exit call cancelled before completion";

/// Identifying properties of an outbound call's backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TargetProperties {
    #[serde(rename = "HOST")]
    pub host: String,
    #[serde(rename = "PORT")]
    pub port: String,
    #[serde(rename = "URL")]
    pub url: String,
}

impl TargetProperties {
    /// Applies the fallback chain to whatever could be extracted.
    ///
    /// host: target host, then the previously known request host, then
    /// `UNKNOWN-HOST`. port: target port, then `UNKNOWN-PORT`. url: built from
    /// the resolved host and the uri, `UNKNOWN-URL` without a uri.
    pub fn from_parts(
        target_host: Option<String>,
        known_host: Option<String>,
        port: Option<String>,
        scheme: Option<&str>,
        uri: Option<&str>,
    ) -> Self {
        let host = target_host
            .or(known_host)
            .unwrap_or_else(|| UNKNOWN_HOST.to_string());
        let url = match uri {
            Some(uri) => build_url(scheme, &host, uri),
            None => UNKNOWN_URL.to_string(),
        };
        Self {
            host,
            port: port.unwrap_or_else(|| UNKNOWN_PORT.to_string()),
            url,
        }
    }

    /// Resolves the properties of `target` as seen from `exchange`.
    pub fn resolve<X>(extractor: &X, exchange: &X::Exchange, target: Option<&X::Target>) -> Self
    where
        X: AttributeExtractor + ?Sized,
    {
        let (target_host, port) = match target {
            Some(target) => (
                best_effort("target host", extractor.target_host(target)).flatten(),
                best_effort("target port", extractor.target_port(target)).flatten(),
            ),
            None => {
                debug!("No target available for exit call");
                (None, None)
            }
        };
        let known_host = best_effort("request host", extractor.request_host(exchange)).flatten();
        let scheme = best_effort("request scheme", extractor.request_scheme(exchange)).flatten();
        let uri = best_effort("request uri", extractor.request_uri(exchange)).flatten();

        Self::from_parts(target_host, known_host, port, scheme.as_deref(), uri.as_deref())
    }

    pub fn has_url(&self) -> bool {
        self.url != UNKNOWN_URL
    }

    pub fn exit_kind(&self) -> ExitKind {
        if self.has_url() {
            ExitKind::Network
        } else {
            ExitKind::Generic
        }
    }

    /// Key the reporter groups the exit call under.
    pub fn key(&self) -> &str {
        if self.has_url() {
            &self.url
        } else {
            &self.host
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCallState {
    Pending,
    Completed,
    Failed,
}

/// An outbound call recorded against a transaction.
pub struct ExitCall {
    handle: Option<Box<dyn ExitCallHandle>>,
    transaction: Arc<dyn TransactionHandle>,
    shared: Arc<TransactionShared>,
    target: TargetProperties,
    kind: ExitKind,
    token: Option<CorrelationToken>,
    state: ExitCallState,
    /// Owned by an `on_completion` future.
    awaited: bool,
}

impl ExitCall {
    pub fn target(&self) -> &TargetProperties {
        &self.target
    }

    pub fn kind(&self) -> ExitKind {
        self.kind
    }

    /// Token propagated to the backend.
    pub fn correlation_token(&self) -> Option<&CorrelationToken> {
        self.token.as_ref()
    }

    pub fn state(&self) -> ExitCallState {
        self.state
    }

    /// Ends the exit call, marking the owning transaction errored on failure.
    pub fn finish(mut self, error: Option<&dyn fmt::Display>) -> ExitCallState {
        self.settle(error.map(ToString::to_string))
    }

    pub fn finish_with<T, E: fmt::Display>(self, result: &Result<T, E>) -> ExitCallState {
        match result {
            Ok(_) => self.finish(None),
            Err(e) => self.finish(Some(e)),
        }
    }

    /// Attaches the end of this exit call to the outbound future.
    ///
    /// The returned future resolves to the outbound result unchanged. It never
    /// touches the transaction beyond marking it errored. Dropping it before
    /// the outbound future settles ends the exit call as failed with
    /// [`CANCELLED`].
    pub fn on_completion<F, T, E>(mut self, outbound: F) -> impl Future<Output = Result<T, E>>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.awaited = true;
        async move {
            let result = outbound.await;
            let state = self.finish_with(&result);
            debug!("Asynchronous exit call settled as {state:?}");
            result
        }
    }

    fn settle(&mut self, error: Option<String>) -> ExitCallState {
        let Some(handle) = self.handle.take() else {
            return self.state;
        };
        self.state = match error {
            Some(description) => {
                debug!("Exit call to {} failed: {description}", self.target.key());
                report_error(self.transaction.as_ref(), &self.shared, &description);
                ExitCallState::Failed
            }
            None => ExitCallState::Completed,
        };
        if let Err(e) = handle.close() {
            error!("Unable to end exit call to {}: {e}", self.target.key());
        }
        self.shared.exit_call_finished();
        self.state
    }
}

impl Drop for ExitCall {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if self.awaited {
            warn!(
                "Exit call to {} cancelled before its outbound call settled",
                self.target.key()
            );
            self.settle(Some(CANCELLED.to_string()));
        } else {
            warn!(
                "Exit call to {} dropped before completion, ending it",
                self.target.key()
            );
            self.settle(None);
        }
    }
}

impl fmt::Debug for ExitCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitCall")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("token", &self.token)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Records outbound calls against open transactions.
pub struct ExitCallRegistrar<X: AttributeExtractor> {
    extractor: Arc<X>,
    config: Arc<Config>,
}

impl<X: AttributeExtractor> ExitCallRegistrar<X> {
    pub fn new(extractor: Arc<X>, config: Arc<Config>) -> Self {
        Self { extractor, config }
    }

    /// Opens an exit call and propagates its correlation token.
    ///
    /// Returns `None`, after logging, when no transaction is open or the
    /// reporter refuses the exit call. A header injection failure is logged
    /// and the exit call is still returned.
    pub fn record(
        &self,
        transaction: Option<&Transaction>,
        target: TargetProperties,
        headers: Option<&mut dyn Injector>,
    ) -> Option<ExitCall> {
        let Some(transaction) = transaction else {
            warn!(
                "{}, skipping exit call to {}",
                Error::ProtocolAnomaly("no transaction is open"),
                target.key()
            );
            return None;
        };

        let kind = target.exit_kind();
        let handle = match transaction
            .handle()
            .open_exit_call(&target, target.key(), kind)
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    "Unable to start exit call to {} for transaction {}: {e}",
                    target.key(),
                    transaction.id()
                );
                return None;
            }
        };
        transaction.shared().exit_call_recorded();

        let token = handle.correlation_token();
        match (&token, headers) {
            (Some(token), Some(headers)) => {
                inject_token(headers, &self.config.correlation_header, token);
            }
            (None, _) => debug!("Reporter supplied no correlation token for {}", target.key()),
            (Some(_), None) => warn!(
                "No outbound headers for exit call to {}, correlation will not propagate",
                target.key()
            ),
        }
        debug!(
            "Recorded {kind:?} exit call to {} for transaction {}",
            target.key(),
            transaction.id()
        );

        Some(ExitCall {
            handle: Some(handle),
            transaction: Arc::clone(transaction.handle()),
            shared: Arc::clone(transaction.shared()),
            target,
            kind,
            token,
            state: ExitCallState::Pending,
            awaited: false,
        })
    }

    /// Resolves target properties and outbound headers through the extractor,
    /// then [`record`](Self::record)s the exit call.
    pub fn record_outbound(
        &self,
        transaction: Option<&Transaction>,
        exchange: &mut X::Exchange,
        target: Option<&X::Target>,
    ) -> Option<ExitCall> {
        let properties = TargetProperties::resolve(self.extractor.as_ref(), exchange, target);
        let headers = best_effort(
            "outbound headers",
            self.extractor.outbound_headers(exchange),
        );
        self.record(transaction, properties, headers)
    }
}
