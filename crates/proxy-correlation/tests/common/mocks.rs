// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock reporter and extractor for exercising the correlation core.
//!
//! The reporter writes every call into a shared journal so tests can assert
//! both what was reported and in which order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proxy_correlation::carrier::{Extractor, Injector};
use proxy_correlation::{
    AttributeExtractor, CorrelationToken, DataScope, EntryKind, EntryPoint, Error, ExitCallHandle,
    ExitKind, Reporter, TargetProperties, TransactionHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Originate {
        transaction: String,
        name: String,
        kind: EntryKind,
    },
    Continue {
        transaction: String,
        token: String,
        name: String,
        kind: EntryKind,
    },
    Attribute {
        transaction: String,
        key: String,
        value: String,
        scopes: Vec<DataScope>,
    },
    MarkError {
        transaction: String,
        description: String,
    },
    OpenExit {
        transaction: String,
        exit: usize,
        key: String,
        kind: ExitKind,
        target: TargetProperties,
    },
    CloseExit {
        transaction: String,
        exit: usize,
    },
    Close {
        transaction: String,
    },
}

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    pub fn position(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(predicate)
    }

    /// Every opened transaction and exit call was closed exactly once.
    pub fn assert_closed_exactly_once(&self) {
        let mut transactions: HashMap<String, usize> = HashMap::new();
        let mut exits: HashMap<usize, usize> = HashMap::new();
        for event in self.events() {
            match event {
                Event::Originate { transaction, .. } | Event::Continue { transaction, .. } => {
                    transactions.entry(transaction).or_insert(0);
                }
                Event::Close { transaction } => {
                    *transactions.entry(transaction).or_insert(0) += 1;
                }
                Event::OpenExit { exit, .. } => {
                    exits.entry(exit).or_insert(0);
                }
                Event::CloseExit { exit, .. } => {
                    *exits.entry(exit).or_insert(0) += 1;
                }
                _ => {}
            }
        }
        for (transaction, closes) in transactions {
            assert_eq!(closes, 1, "transaction {transaction} closed {closes} times");
        }
        for (exit, closes) in exits {
            assert_eq!(closes, 1, "exit call {exit} closed {closes} times");
        }
    }
}

#[derive(Default)]
pub struct MockReporter {
    pub journal: Journal,
    next_transaction: AtomicUsize,
    next_exit: Arc<AtomicUsize>,
    pub fail_open: bool,
    pub fail_exit: bool,
    pub reject_attributes: bool,
    pub withhold_exit_token: bool,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses to open any transaction.
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Opens transactions but refuses every exit call.
    pub fn failing_exit() -> Self {
        Self {
            fail_exit: true,
            ..Self::default()
        }
    }

    pub fn rejecting_attributes() -> Self {
        Self {
            reject_attributes: true,
            ..Self::default()
        }
    }

    /// Opens exit calls without handing out a correlation token.
    pub fn withholding_exit_token() -> Self {
        Self {
            withhold_exit_token: true,
            ..Self::default()
        }
    }

    fn handle(&self) -> Arc<dyn TransactionHandle> {
        let id = self.next_transaction.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(MockTransaction {
            id: format!("tx-{id}"),
            journal: self.journal.clone(),
            next_exit: Arc::clone(&self.next_exit),
            fail_exit: self.fail_exit,
            reject_attributes: self.reject_attributes,
            withhold_exit_token: self.withhold_exit_token,
        })
    }
}

impl Reporter for MockReporter {
    fn originate_transaction(
        &self,
        entry: &EntryPoint,
    ) -> Result<Arc<dyn TransactionHandle>, Error> {
        if self.fail_open {
            return Err(Error::reporter("originate transaction", "agent not ready"));
        }
        let handle = self.handle();
        self.journal.push(Event::Originate {
            transaction: handle.unique_id(),
            name: entry.name.clone(),
            kind: entry.kind,
        });
        Ok(handle)
    }

    fn continue_transaction(
        &self,
        token: &CorrelationToken,
        entry: &EntryPoint,
    ) -> Result<Arc<dyn TransactionHandle>, Error> {
        if self.fail_open {
            return Err(Error::reporter("continue transaction", "agent not ready"));
        }
        let handle = self.handle();
        self.journal.push(Event::Continue {
            transaction: handle.unique_id(),
            token: token.to_string(),
            name: entry.name.clone(),
            kind: entry.kind,
        });
        Ok(handle)
    }
}

pub struct MockTransaction {
    id: String,
    journal: Journal,
    next_exit: Arc<AtomicUsize>,
    fail_exit: bool,
    reject_attributes: bool,
    withhold_exit_token: bool,
}

impl TransactionHandle for MockTransaction {
    fn unique_id(&self) -> String {
        self.id.clone()
    }

    fn attach_attribute(&self, key: &str, value: &str, scopes: &[DataScope]) -> Result<(), Error> {
        if self.reject_attributes {
            return Err(Error::reporter("attach attribute", "collector disabled"));
        }
        self.journal.push(Event::Attribute {
            transaction: self.id.clone(),
            key: key.to_string(),
            value: value.to_string(),
            scopes: scopes.to_vec(),
        });
        Ok(())
    }

    fn mark_error(&self, description: &str) -> Result<(), Error> {
        self.journal.push(Event::MarkError {
            transaction: self.id.clone(),
            description: description.to_string(),
        });
        Ok(())
    }

    fn open_exit_call(
        &self,
        target: &TargetProperties,
        key: &str,
        kind: ExitKind,
    ) -> Result<Box<dyn ExitCallHandle>, Error> {
        if self.fail_exit {
            return Err(Error::reporter("open exit call", "backend limit reached"));
        }
        let exit = self.next_exit.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.push(Event::OpenExit {
            transaction: self.id.clone(),
            exit,
            key: key.to_string(),
            kind,
            target: target.clone(),
        });
        let token = if self.withhold_exit_token {
            None
        } else {
            CorrelationToken::parse(&format!("{}*exit={exit}", self.id)).ok()
        };
        Ok(Box::new(MockExitCall {
            transaction: self.id.clone(),
            exit,
            token,
            journal: self.journal.clone(),
        }))
    }

    fn close(&self) -> Result<(), Error> {
        self.journal.push(Event::Close {
            transaction: self.id.clone(),
        });
        Ok(())
    }
}

pub struct MockExitCall {
    transaction: String,
    exit: usize,
    token: Option<CorrelationToken>,
    journal: Journal,
}

impl ExitCallHandle for MockExitCall {
    fn correlation_token(&self) -> Option<CorrelationToken> {
        self.token.clone()
    }

    fn close(&self) -> Result<(), Error> {
        self.journal.push(Event::CloseExit {
            transaction: self.transaction.clone(),
            exit: self.exit,
        });
        Ok(())
    }
}

/// Outbound header collection that can be made read-only.
#[derive(Debug, Default)]
pub struct MockHeaders {
    pub entries: Vec<(String, String)>,
    pub read_only: bool,
}

impl MockHeaders {
    pub fn get(&self, key: &str) -> Option<&str> {
        Extractor::get(&self.entries, key)
    }
}

impl Injector for MockHeaders {
    fn set(&mut self, key: &str, value: String) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::inject(key, "headers already sent"));
        }
        self.entries.set(key, value)
    }
}

#[derive(Debug, Default)]
pub struct MockExchange {
    pub uri: Option<String>,
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub proxy_name: Option<String>,
    pub outbound: MockHeaders,
    /// Attributes whose extraction fails.
    pub failing: Vec<&'static str>,
}

impl MockExchange {
    pub fn inbound(uri: &str, correlation: Option<&str>) -> Self {
        let mut headers = vec![("Accept".to_string(), "*/*".to_string())];
        if let Some(token) = correlation {
            headers.push(("singularityheader".to_string(), token.to_string()));
        }
        Self {
            uri: Some(uri.to_string()),
            scheme: Some("https".to_string()),
            host: Some("svc".to_string()),
            method: Some("GET".to_string()),
            headers,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct MockTarget {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub failing: bool,
}

impl MockTarget {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: Some(host.to_string()),
            port: Some(port),
            failing: false,
        }
    }
}

#[derive(Default)]
pub struct MockExtractor {
    /// Fail every single call, as a broken reflective layer would.
    pub fail_everything: bool,
}

impl MockExtractor {
    fn check(&self, exchange: &MockExchange, attribute: &'static str) -> Result<(), Error> {
        if self.fail_everything || exchange.failing.contains(&attribute) {
            return Err(Error::extract(attribute, "reflective lookup failed"));
        }
        Ok(())
    }
}

impl AttributeExtractor for MockExtractor {
    type Exchange = MockExchange;
    type Target = MockTarget;

    fn request_uri(&self, exchange: &MockExchange) -> Result<Option<String>, Error> {
        self.check(exchange, "uri")?;
        Ok(exchange.uri.clone())
    }

    fn request_scheme(&self, exchange: &MockExchange) -> Result<Option<String>, Error> {
        self.check(exchange, "scheme")?;
        Ok(exchange.scheme.clone())
    }

    fn request_host(&self, exchange: &MockExchange) -> Result<Option<String>, Error> {
        self.check(exchange, "host")?;
        Ok(exchange.host.clone())
    }

    fn request_headers(&self, exchange: &MockExchange) -> Result<Vec<(String, String)>, Error> {
        self.check(exchange, "headers")?;
        Ok(exchange.headers.clone())
    }

    fn request_method(&self, exchange: &MockExchange) -> Result<Option<String>, Error> {
        self.check(exchange, "method")?;
        Ok(exchange.method.clone())
    }

    fn request_cookies(&self, exchange: &MockExchange) -> Result<Vec<(String, String)>, Error> {
        self.check(exchange, "cookies")?;
        Ok(exchange.cookies.clone())
    }

    fn proxy_display_name(&self, exchange: &MockExchange) -> Result<Option<String>, Error> {
        self.check(exchange, "proxy")?;
        Ok(exchange.proxy_name.clone())
    }

    fn target_host(&self, target: &MockTarget) -> Result<Option<String>, Error> {
        if self.fail_everything || target.failing {
            return Err(Error::extract("target host", "reflective lookup failed"));
        }
        Ok(target.host.clone())
    }

    fn target_port(&self, target: &MockTarget) -> Result<Option<String>, Error> {
        if self.fail_everything || target.failing {
            return Err(Error::extract("target port", "reflective lookup failed"));
        }
        Ok(target.port.map(|port| port.to_string()))
    }

    fn outbound_headers<'a>(
        &self,
        exchange: &'a mut MockExchange,
    ) -> Result<&'a mut dyn Injector, Error> {
        self.check(exchange, "outbound headers")?;
        Ok(&mut exchange.outbound)
    }
}
