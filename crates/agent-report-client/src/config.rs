// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Session configuration and environment-variable resolution.

use crate::transport::SendStrategy;
use std::env;
use std::time::Duration;
use tracing::warn;

/// Environment variable that overrides the maximum reports batch size.
pub const MAX_BATCH_SIZE_ENV_VAR: &str = "AGENT_MAX_REPORTS_BATCH_SIZE";

/// Default maximum number of reports per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves the maximum batch size from the environment.
///
/// Absent, unparsable, or non-positive values fall back to
/// [`DEFAULT_MAX_BATCH_SIZE`]. Called once at session construction; the
/// resolved value is immutable for the life of the session.
pub fn resolve_max_batch_size() -> usize {
    let raw = env::var(MAX_BATCH_SIZE_ENV_VAR).ok();
    parse_max_batch_size(raw.as_deref())
}

fn parse_max_batch_size(raw: Option<&str>) -> usize {
    match raw {
        None => DEFAULT_MAX_BATCH_SIZE,
        Some(value) => match value.trim().parse::<usize>() {
            Ok(parsed) if parsed > 0 => parsed,
            _ => {
                warn!(
                    "Failed to interpret {}={:?}; using the default batch size {}",
                    MAX_BATCH_SIZE_ENV_VAR, value, DEFAULT_MAX_BATCH_SIZE
                );
                DEFAULT_MAX_BATCH_SIZE
            }
        },
    }
}

/// Immutable per-session configuration, created once when the session is
/// built and shared read-only by producers and the delivery worker.
#[derive(Debug)]
pub struct SessionContext {
    /// Agent API base URL, e.g. `http://localhost:8585`.
    pub agent_url: String,
    /// Driver session identifier used to correlate reports server-side.
    pub session_id: String,
    /// Batch vs single-report delivery.
    pub strategy: SendStrategy,
    /// Resolved maximum number of reports per batch.
    pub max_batch_size: usize,
    /// How often the worker wakes to ship pending reports.
    pub flush_interval: Duration,
    /// Per-request timeout against the Agent.
    pub request_timeout: Duration,
    /// Deadline for drain on teardown.
    pub close_timeout: Duration,
    /// Development token, sent as the Authorization header when present.
    pub token: Option<String>,
}

impl SessionContext {
    pub fn new(agent_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        SessionContext {
            agent_url: agent_url.into(),
            session_id: session_id.into(),
            strategy: SendStrategy::Batch,
            max_batch_size: resolve_max_batch_size(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            token: None,
        }
    }
}
