// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors surfaced to the owner of a reporting session.
///
/// Configuration and serialization problems are handled inside the pipeline
/// (logged, never propagated); only conditions the caller can act on appear
/// here.
#[derive(Debug, thiserror::Error)]
pub enum ReportingError {
    /// The session was closed to producers; the report was not accepted.
    #[error("report queue is closed")]
    QueueClosed,

    /// The delivery worker gave up after the consecutive-failure budget was
    /// exhausted. No further network attempts are made for this session.
    #[error("report delivery failed permanently after {attempts} consecutive attempts")]
    FatalDelivery { attempts: u32 },

    /// A drain in progress was cancelled before the queue emptied.
    #[error("report drain was cancelled before completion")]
    Cancelled,

    /// The worker did not finish draining within the configured deadline.
    #[error("session teardown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// The delivery worker exited without answering; usually a panic.
    #[error("delivery worker is no longer running")]
    WorkerGone,

    /// The Agent base address could not be turned into request URLs.
    #[error("invalid agent address: {0}")]
    InvalidAgentUrl(String),

    /// Session construction inputs that cannot be used as given.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ReportingError::FatalDelivery { attempts: 4 };
        assert_eq!(
            error.to_string(),
            "report delivery failed permanently after 4 consecutive attempts"
        );
    }

    #[test]
    fn test_invalid_url_display() {
        let error = ReportingError::InvalidAgentUrl("not a url".to_string());
        assert_eq!(error.to_string(), "invalid agent address: not a url");
    }
}
