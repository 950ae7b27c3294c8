// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;

use hyper::header::HeaderName;
use tracing::info;

use crate::reporter::DataScope;
use crate::token::CORRELATION_HEADER_KEY;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Header carrying the correlation token, always lowercase.
    pub correlation_header: String,
    /// Attach the proxy display name to analytics data as well as snapshots.
    pub proxy_name_analytics: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            correlation_header: CORRELATION_HEADER_KEY.to_string(),
            proxy_name_analytics: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let correlation_header = match env::var("PROXY_CORRELATION_HEADER") {
            Ok(header) => HeaderName::from_bytes(header.trim().as_bytes())
                .map_err(|err| {
                    anyhow::anyhow!("Invalid PROXY_CORRELATION_HEADER {header:?}: {err}")
                })?
                .as_str()
                .to_string(),
            Err(_) => CORRELATION_HEADER_KEY.to_string(),
        };

        // anything other than "false" turns analytics off
        let proxy_name_analytics = env::var("PROXY_CORRELATION_DISABLE_ANALYTICS")
            .map(|val| val.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        if proxy_name_analytics {
            info!("Enabling analytics collection of proxy name data, to disable set PROXY_CORRELATION_DISABLE_ANALYTICS=true");
        }

        let log_level = env::var("PROXY_CORRELATION_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        Ok(Config {
            correlation_header,
            proxy_name_analytics,
            log_level,
        })
    }

    /// Scopes custom attributes are attached with.
    pub fn data_scopes(&self) -> Vec<DataScope> {
        let mut scopes = vec![DataScope::Snapshots];
        if self.proxy_name_analytics {
            scopes.push(DataScope::Analytics);
        }
        scopes
    }
}
