// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use reqwest::ClientBuilder;

use crate::error::ConfigError;

/// Creates a reqwest client builder using rustls for TLS.
fn create_reqwest_client_builder() -> ClientBuilder {
    reqwest::Client::builder().use_rustls_tls()
}

/// Builds a reqwest client with optional HTTPS proxy configuration and timeout.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, ConfigError> {
    let mut builder = create_reqwest_client_builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        let proxy = reqwest::Proxy::https(proxy)
            .map_err(|e| ConfigError::HttpClient(format!("invalid proxy '{proxy}': {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}
