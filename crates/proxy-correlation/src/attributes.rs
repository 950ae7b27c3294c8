// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Attribute extraction boundary.
//!
//! The core never looks inside the proxy's request or response objects itself.
//! An [`AttributeExtractor`] implementation, written once per proxy runtime,
//! answers narrow questions about an exchange (its uri, its headers, the proxy
//! it was routed through). Every answer is fallible, and every failure is
//! treated as "attribute unavailable" by the callers in this crate.

use serde::Serialize;
use tracing::{debug, warn};

use crate::carrier::Injector;
use crate::error::Error;
use crate::token::{extract_token, CorrelationToken};

/// Placeholder host used when no host could be resolved.
pub const UNKNOWN_HOST: &str = "UNKNOWN-HOST";

const DEFAULT_SCHEME: &str = "http";

/// Host-specific access to the proxied exchange.
///
/// `Exchange` is the request/response pair the proxy is handling; `Target` is
/// the backend the proxy is about to call.
pub trait AttributeExtractor: Send + Sync {
    type Exchange: ?Sized;
    type Target: ?Sized;

    /// Path and query of the request, e.g. `/api/orders?id=1`.
    fn request_uri(&self, exchange: &Self::Exchange) -> Result<Option<String>, Error>;

    fn request_scheme(&self, exchange: &Self::Exchange) -> Result<Option<String>, Error>;

    fn request_host(&self, exchange: &Self::Exchange) -> Result<Option<String>, Error>;

    /// Request headers in arrival order.
    fn request_headers(&self, exchange: &Self::Exchange) -> Result<Vec<(String, String)>, Error>;

    fn request_method(&self, exchange: &Self::Exchange) -> Result<Option<String>, Error>;

    fn request_cookies(&self, _exchange: &Self::Exchange) -> Result<Vec<(String, String)>, Error> {
        Ok(Vec::new())
    }

    fn query_parameters(
        &self,
        _exchange: &Self::Exchange,
    ) -> Result<Vec<(String, Vec<String>)>, Error> {
        Ok(Vec::new())
    }

    /// Address of the client that sent the request.
    fn originating_address(&self, _exchange: &Self::Exchange) -> Result<Option<String>, Error> {
        Ok(None)
    }

    /// Host the response is addressed to.
    fn response_target_host(&self, _exchange: &Self::Exchange) -> Result<Option<String>, Error> {
        Ok(None)
    }

    /// Human readable name of the proxy or route that handled the exchange.
    fn proxy_display_name(&self, _exchange: &Self::Exchange) -> Result<Option<String>, Error> {
        Ok(None)
    }

    fn target_host(&self, target: &Self::Target) -> Result<Option<String>, Error>;

    fn target_port(&self, target: &Self::Target) -> Result<Option<String>, Error>;

    /// Header collection of the request about to be sent to the backend.
    fn outbound_headers<'a>(
        &self,
        exchange: &'a mut Self::Exchange,
    ) -> Result<&'a mut dyn Injector, Error>;
}

/// Unwraps an extraction result, logging and discarding the failure.
pub(crate) fn best_effort<T>(attribute: &str, result: Result<T, Error>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Unable to read {attribute}, treating it as unavailable: {e}");
            None
        }
    }
}

/// Builds `scheme://host uri`, defaulting the scheme to `http`.
pub fn build_url(scheme: Option<&str>, host: &str, uri: &str) -> String {
    format!("{}://{}{}", scheme.unwrap_or(DEFAULT_SCHEME), host, uri)
}

/// Attribute bag describing an inbound request.
///
/// Every field is filled on a best effort basis. `headers` is `None` only when
/// the extractor failed to produce them, which is distinct from a request that
/// simply has no headers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<(String, String)>>,
    pub cookies: Vec<(String, String)>,
    pub query_parameters: Vec<(String, Vec<String>)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originating_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_value: Option<String>,
}

impl RequestAttributes {
    /// Collects everything the extractor can tell about `exchange`.
    pub fn collect<X>(extractor: &X, exchange: &X::Exchange) -> Self
    where
        X: AttributeExtractor + ?Sized,
    {
        let uri = best_effort("request uri", extractor.request_uri(exchange)).flatten();
        let url = uri.map(|uri| {
            let host = best_effort("request host", extractor.request_host(exchange))
                .flatten()
                .unwrap_or_else(|| UNKNOWN_HOST.to_string());
            let scheme = best_effort("request scheme", extractor.request_scheme(exchange)).flatten();
            build_url(scheme.as_deref(), &host, &uri)
        });

        let attributes = Self {
            url,
            method: best_effort("request method", extractor.request_method(exchange)).flatten(),
            headers: best_effort("request headers", extractor.request_headers(exchange)),
            cookies: best_effort("request cookies", extractor.request_cookies(exchange))
                .unwrap_or_default(),
            query_parameters: best_effort(
                "query parameters",
                extractor.query_parameters(exchange),
            )
            .unwrap_or_default(),
            originating_address: best_effort(
                "originating address",
                extractor.originating_address(exchange),
            )
            .flatten(),
            host_value: best_effort(
                "response target host",
                extractor.response_target_host(exchange),
            )
            .flatten(),
        };
        debug!("Collected request attributes: {attributes:?}");
        attributes
    }

    /// Correlation token carried by the request headers, if any.
    pub fn correlation_token(&self, header: &str) -> Option<CorrelationToken> {
        extract_token(self.headers.as_ref()?, header)
    }
}
