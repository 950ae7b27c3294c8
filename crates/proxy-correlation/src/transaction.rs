// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transaction tracking for inbound calls.
//!
//! ```text
//! Idle ──begin──▶ Open ──end──▶ Closed
//!                  │
//!                  ├─ attach_attribute (0..n)
//!                  └─ ExitCallRegistrar::record (0..n)
//! ```
//!
//! `begin` hands back an owned [`Transaction`]; `end` consumes it, so a
//! transaction cannot be closed twice. A transaction dropped while still open
//! is closed by its destructor and the defect is logged.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::attributes::{best_effort, AttributeExtractor, RequestAttributes};
use crate::config::Config;
use crate::error::Error;
use crate::reporter::{DataScope, EntryKind, EntryPoint, Reporter, TransactionHandle};
use crate::token::CorrelationToken;

/// Attribute key for the proxy or route that handled the exchange.
pub const PROXY_NAME_ATTRIBUTE: &str = "ProxyName";

/// The intercepted method an inbound call was observed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSite {
    /// Fully qualified class (or type) name.
    pub class_name: String,
    pub method_name: String,
}

impl CallSite {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}()", self.class_name, self.method_name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Closed,
}

/// State shared between a transaction and the exit calls it spawned, which may
/// complete on other threads.
#[derive(Debug, Default)]
pub(crate) struct TransactionShared {
    errored: AtomicBool,
    recorded: AtomicUsize,
    finished: AtomicUsize,
}

impl TransactionShared {
    pub(crate) fn mark_errored(&self) {
        self.errored.store(true, Ordering::Release);
    }

    pub(crate) fn exit_call_recorded(&self) {
        self.recorded.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn exit_call_finished(&self) {
        self.finished.fetch_add(1, Ordering::AcqRel);
    }
}

/// Marks `handle` as errored, logging instead of failing.
pub(crate) fn report_error(
    handle: &dyn TransactionHandle,
    shared: &TransactionShared,
    description: &str,
) {
    shared.mark_errored();
    if let Err(e) = handle.mark_error(description) {
        warn!("Unable to mark transaction {} as errored: {e}", handle.unique_id());
    }
}

/// One logical unit of work spanning an inbound call.
pub struct Transaction {
    id: String,
    kind: EntryKind,
    inbound_token: Option<CorrelationToken>,
    handle: Arc<dyn TransactionHandle>,
    attributes: HashMap<String, String>,
    scopes: Vec<DataScope>,
    state: TransactionState,
    shared: Arc<TransactionShared>,
}

impl Transaction {
    fn open(
        handle: Arc<dyn TransactionHandle>,
        kind: EntryKind,
        inbound_token: Option<CorrelationToken>,
        scopes: Vec<DataScope>,
    ) -> Self {
        Self {
            id: handle.unique_id(),
            kind,
            inbound_token,
            handle,
            attributes: HashMap::new(),
            scopes,
            state: TransactionState::Open,
            shared: Arc::new(TransactionShared::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Token the transaction was continued from, `None` if it originated here.
    pub fn inbound_token(&self) -> Option<&CorrelationToken> {
        self.inbound_token.as_ref()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_errored(&self) -> bool {
        self.shared.errored.load(Ordering::Acquire)
    }

    /// Attributes successfully attached so far.
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    pub fn recorded_exit_calls(&self) -> usize {
        self.shared.recorded.load(Ordering::Acquire)
    }

    /// Exit calls recorded but not yet finished.
    pub fn pending_exit_calls(&self) -> usize {
        self.recorded_exit_calls()
            .saturating_sub(self.shared.finished.load(Ordering::Acquire))
    }

    pub(crate) fn handle(&self) -> &Arc<dyn TransactionHandle> {
        &self.handle
    }

    pub(crate) fn shared(&self) -> &Arc<TransactionShared> {
        &self.shared
    }

    /// Attaches a custom attribute with the configured data scopes.
    ///
    /// Returns whether the reporter accepted it.
    pub fn attach_attribute(&mut self, key: &str, value: &str) -> bool {
        match self.handle.attach_attribute(key, value, &self.scopes) {
            Ok(()) => {
                self.attributes.insert(key.to_string(), value.to_string());
                true
            }
            Err(e) => {
                warn!("Unable to attach {key} to transaction {}: {e}", self.id);
                false
            }
        }
    }

    pub fn mark_error(&self, description: &str) {
        report_error(self.handle.as_ref(), &self.shared, description);
    }

    /// Closes the transaction, marking it errored first when the inbound call
    /// failed.
    ///
    /// Exit calls still in flight keep running and end on their own.
    pub fn end(mut self, error: Option<&dyn fmt::Display>) {
        if let Some(error) = error {
            self.mark_error(&error.to_string());
        }
        let pending = self.pending_exit_calls();
        if pending > 0 {
            debug!(
                "Closing transaction {} with {pending} exit call(s) still pending",
                self.id
            );
        }
        self.close();
    }

    fn close(&mut self) {
        self.state = TransactionState::Closed;
        match self.handle.close() {
            Ok(()) => debug!("Transaction {} closed", self.id),
            Err(e) => error!("Unable to close transaction {}: {e}", self.id),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            warn!("Transaction {} dropped without being ended, closing it", self.id);
            self.close();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("inbound_token", &self.inbound_token)
            .field("state", &self.state)
            .field("errored", &self.is_errored())
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Opens and continues transactions for inbound calls.
pub struct TransactionTracker<X: AttributeExtractor> {
    extractor: Arc<X>,
    reporter: Arc<dyn Reporter>,
    config: Arc<Config>,
}

impl<X: AttributeExtractor> TransactionTracker<X> {
    pub fn new(extractor: Arc<X>, reporter: Arc<dyn Reporter>, config: Arc<Config>) -> Self {
        Self {
            extractor,
            reporter,
            config,
        }
    }

    /// Starts tracking an inbound call.
    ///
    /// Returns `None` only when the reporter could not open a transaction;
    /// the inbound call then proceeds uninstrumented.
    pub fn begin(
        &self,
        exchange: &X::Exchange,
        call_site: &CallSite,
        kind: EntryKind,
    ) -> Option<Transaction> {
        debug!("begin start: {call_site}");
        match self.try_begin(exchange, call_site, kind) {
            Ok(transaction) => {
                debug!("begin end: {call_site} transaction {}", transaction.id());
                Some(transaction)
            }
            Err(e) => {
                error!("Unable to start transaction for {call_site}: {e}");
                None
            }
        }
    }

    /// Same as [`begin`](Self::begin), surfacing the reporter failure.
    pub fn try_begin(
        &self,
        exchange: &X::Exchange,
        call_site: &CallSite,
        kind: EntryKind,
    ) -> Result<Transaction, Error> {
        let attributes = RequestAttributes::collect(self.extractor.as_ref(), exchange);
        let token = attributes.correlation_token(&self.config.correlation_header);
        let entry = entry_point(call_site, kind, attributes);

        let handle = match &token {
            Some(token) => self.reporter.continue_transaction(token, &entry)?,
            None => self.reporter.originate_transaction(&entry)?,
        };
        let mut transaction = Transaction::open(handle, kind, token, self.config.data_scopes());

        let proxy_name = best_effort(
            "proxy display name",
            self.extractor.proxy_display_name(exchange),
        )
        .flatten();
        if let Some(name) = proxy_name {
            transaction.attach_attribute(PROXY_NAME_ATTRIBUTE, &name);
        }

        Ok(transaction)
    }
}

/// Names the transaction: the URL for network entries when known, the call
/// site's class otherwise.
fn entry_point(
    call_site: &CallSite,
    kind: EntryKind,
    attributes: RequestAttributes,
) -> EntryPoint {
    match kind {
        EntryKind::Network => EntryPoint {
            name: attributes
                .url
                .clone()
                .unwrap_or_else(|| call_site.class_name.clone()),
            kind,
            request: Some(attributes),
        },
        EntryKind::Internal => EntryPoint {
            name: call_site.class_name.clone(),
            kind,
            request: None,
        },
    }
}
