// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use samsara_sdk::{Client, Config, Event, FlushOutcome};

mod logger;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("SAMSARA_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(logger::Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}. Shutting down.");
            return;
        }
    };

    let client = match Client::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating Samsara client: {e}. Shutting down.");
            return;
        }
    };
    if !client.is_publishing() {
        info!("Background publishing disabled, events are only sent on shutdown");
    }

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut recorded: u64 = 0;
    let mut rejected: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Received interrupt, stopping");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if record_line(&client, &line) {
                        recorded += 1;
                    } else {
                        rejected += 1;
                    }
                }
                Ok(None) => {
                    debug!("End of input reached");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from stdin: {e}");
                    break;
                }
            }
        }
    }

    info!("Recorded {recorded} events, rejected {rejected}");

    match client.stop_publishing().await {
        FlushOutcome::Retained(n) => warn!("Dropping {n} events that could not be published"),
        FlushOutcome::Delivered(n) => debug!("Published {n} remaining events"),
        FlushOutcome::Skipped => {}
    }
}

/// Parses one line of input as a JSON object and records it.
fn record_line(client: &Client, line: &str) -> bool {
    let value = match serde_json::from_str::<serde_json::Value>(line.trim()) {
        Ok(value) => value,
        Err(e) => {
            warn!("Skipping malformed JSON line: {e}");
            return false;
        }
    };
    let event = match Event::try_from(value) {
        Ok(event) => event,
        Err(other) => {
            warn!("Skipping non-object JSON value: {other}");
            return false;
        }
    };

    match client.record_event(event) {
        Ok(()) => true,
        Err(e) => {
            warn!("Rejected event: {e}");
            false
        }
    }
}
