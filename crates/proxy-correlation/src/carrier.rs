// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Carrier traits for correlation header propagation.
//!
//! Carriers abstract over the header collections of inbound and outbound
//! requests so the token logic does not care whether it is looking at a
//! `HashMap`, a JSON object, an ordered header list or a `hyper::HeaderMap`.
//!
//! # Case Insensitivity
//!
//! All carriers match keys case-insensitively, mirroring HTTP header
//! semantics (`SingularityHeader` and `singularityheader` are the same key).
//!
//! # Fallible Injection
//!
//! Unlike extraction, writing into a carrier can fail: a JSON carrier may not
//! be an object, a `HeaderMap` rejects values with control characters. The
//! `Injector` reports those failures and leaves it to the caller to decide
//! whether they matter.

use std::collections::HashMap;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::Error;

/// Trait for writing headers into an outbound carrier.
pub trait Injector {
    /// Sets `key` to `value`, replacing any value previously stored under the
    /// same key regardless of case.
    fn set(&mut self, key: &str, value: String) -> Result<(), Error>;
}

/// Trait for reading headers from an inbound carrier.
pub trait Extractor {
    /// Gets the first value stored under `key` (case-insensitive).
    fn get(&self, key: &str) -> Option<&str>;

    /// Gets all keys present in the carrier.
    fn keys(&self) -> Vec<&str>;
}

/// Stores keys in lowercase. Keys inserted directly, with any casing, are still
/// matched and replaced case-insensitively.
impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) -> Result<(), Error> {
        self.retain(|name, _| !name.eq_ignore_ascii_case(key));
        self.insert(key.to_lowercase(), value);
        Ok(())
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect::<Vec<_>>()
    }
}

/// Only `Value::Object` can carry headers; anything else rejects injection.
impl Injector for Value {
    fn set(&mut self, key: &str, value: String) -> Result<(), Error> {
        match self {
            Value::Object(map) => {
                map.retain(|name, _| !name.eq_ignore_ascii_case(key));
                map.insert(key.to_lowercase(), Value::String(value));
                Ok(())
            }
            _ => Err(Error::inject(key, "carrier is not a JSON object")),
        }
    }
}

impl Extractor for Value {
    fn get(&self, key: &str) -> Option<&str> {
        if let Value::Object(map) = self {
            map.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .and_then(|(_, v)| v.as_str())
        } else {
            None
        }
    }

    fn keys(&self) -> Vec<&str> {
        if let Value::Object(map) = self {
            map.keys().map(String::as_str).collect::<Vec<_>>()
        } else {
            Vec::new()
        }
    }
}

/// Ordered header list, as handed over by most proxies.
///
/// Header casing is kept as received. Duplicates are allowed on the way in, but
/// `set` collapses every case-insensitive match into a single entry.
impl Injector for Vec<(String, String)> {
    fn set(&mut self, key: &str, value: String) -> Result<(), Error> {
        self.retain(|(name, _)| !name.eq_ignore_ascii_case(key));
        self.push((key.to_string(), value));
        Ok(())
    }
}

impl Extractor for Vec<(String, String)> {
    fn get(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>()
    }
}

impl Injector for HeaderMap {
    fn set(&mut self, key: &str, value: String) -> Result<(), Error> {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| Error::inject(key, format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| Error::inject(key, format!("invalid header value: {e}")))?;
        self.insert(name, value);
        Ok(())
    }
}

impl Extractor for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        HeaderMap::keys(self)
            .map(HeaderName::as_str)
            .collect::<Vec<_>>()
    }
}
