// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reporting session lifecycle.
//!
//! A [`Session`] owns one delivery pipeline: a queue, a background worker,
//! and the transport to the Agent. It is created through the typed
//! [`SessionBuilder`], used from test code via [`Session::report`] and
//! [`Session::flush`], and torn down with [`Session::close`], which drains
//! the queue before the session is considered gone.

use crate::config::SessionContext;
use crate::delivery::{DeliveryService, DeliveryState, ReporterHandle};
use crate::error::ReportingError;
use crate::report::Report;
use crate::transport::{AgentApi, SendStrategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long a cancelled worker gets to acknowledge before teardown gives up
/// on it entirely.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Builder for reporting sessions.
///
/// Construction is explicit and typed; every supported knob is a method, so
/// there is no runtime signature matching and no way to ask for a variant
/// that does not exist.
#[derive(Debug)]
pub struct SessionBuilder {
    agent_url: String,
    session_id: String,
    strategy: SendStrategy,
    token: Option<String>,
    flush_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    close_timeout: Option<Duration>,
    reports_disabled: bool,
}

impl SessionBuilder {
    pub fn new(agent_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        SessionBuilder {
            agent_url: agent_url.into(),
            session_id: session_id.into(),
            strategy: SendStrategy::default(),
            token: None,
            flush_interval: None,
            request_timeout: None,
            close_timeout: None,
            reports_disabled: false,
        }
    }

    /// Development token used to authorize with the Agent.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Batch vs single-report delivery.
    #[must_use]
    pub fn with_send_strategy(mut self, strategy: SendStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// How often the worker wakes to ship pending reports.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Per-request timeout against the Agent.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Deadline for the drain performed by [`Session::close`].
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// Disables reporting entirely. A disabled session accepts reports and
    /// discards them without spawning any delivery machinery. Once disabled
    /// at construction, reporting can not be enabled later.
    #[must_use]
    pub fn with_reports_disabled(mut self, disabled: bool) -> Self {
        self.reports_disabled = disabled;
        self
    }

    /// Resolves configuration, spawns the delivery worker, and returns the
    /// session. Must be called within a tokio runtime.
    pub fn build(self) -> Result<Session, ReportingError> {
        let mut context = SessionContext::new(self.agent_url, self.session_id);
        context.strategy = self.strategy;
        context.token = self.token;
        if let Some(interval) = self.flush_interval {
            context.flush_interval = interval;
        }
        if let Some(request_timeout) = self.request_timeout {
            context.request_timeout = request_timeout;
        }
        if let Some(close_timeout) = self.close_timeout {
            context.close_timeout = close_timeout;
        }
        let context = Arc::new(context);

        if self.reports_disabled {
            debug!(session_id = %context.session_id, "reports disabled; session discards everything");
            return Ok(Session {
                context,
                pipeline: None,
            });
        }

        let api = AgentApi::new(&context)?;
        let cancel = CancellationToken::new();
        let (service, handle) = DeliveryService::new(
            Arc::new(api),
            context.session_id.clone(),
            context.max_batch_size,
            context.flush_interval,
            cancel.clone(),
        );
        let worker = tokio::spawn(service.run());

        Ok(Session {
            context,
            pipeline: Some(Pipeline {
                handle,
                worker,
                cancel,
            }),
        })
    }
}

struct Pipeline {
    handle: ReporterHandle,
    worker: JoinHandle<()>,
    cancel: CancellationToken,
}

/// One driver lifetime's reporting pipeline.
pub struct Session {
    context: Arc<SessionContext>,
    pipeline: Option<Pipeline>,
}

impl Session {
    pub fn builder(
        agent_url: impl Into<String>,
        session_id: impl Into<String>,
    ) -> SessionBuilder {
        SessionBuilder::new(agent_url, session_id)
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Whether this session actually delivers reports.
    pub fn reports_enabled(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Hands a report to the pipeline. Never blocks on network I/O.
    pub fn report(&self, report: Report) -> Result<(), ReportingError> {
        match &self.pipeline {
            Some(pipeline) => pipeline.handle.enqueue(report),
            None => Ok(()),
        }
    }

    /// Clonable producer handle for reporting from other threads or tasks.
    /// `None` when reports are disabled.
    pub fn handle(&self) -> Option<ReporterHandle> {
        self.pipeline.as_ref().map(|p| p.handle.clone())
    }

    /// Forces every outstanding report to the Agent before returning.
    pub async fn flush(&self) -> Result<(), ReportingError> {
        match &self.pipeline {
            Some(pipeline) => pipeline.handle.flush().await,
            None => Ok(()),
        }
    }

    pub fn state(&self) -> DeliveryState {
        match &self.pipeline {
            Some(pipeline) => pipeline.handle.state(),
            None => DeliveryState::Stopped,
        }
    }

    /// Error/fatal-failure notification channel. `None` when reports are
    /// disabled.
    pub fn watch_state(&self) -> Option<watch::Receiver<DeliveryState>> {
        self.pipeline.as_ref().map(|p| p.handle.watch_state())
    }

    /// Tears the session down: closes the queue to producers, drains every
    /// outstanding report, and joins the worker. Returns once the worker has
    /// exited; a fatal delivery failure, cancellation, or an expired
    /// deadline each surface as their own error.
    pub async fn close(mut self) -> Result<(), ReportingError> {
        let Some(pipeline) = self.pipeline.take() else {
            return Ok(());
        };
        let close_timeout = self.context.close_timeout;

        let mut reply = match pipeline.handle.request_shutdown() {
            Ok(reply) => reply,
            Err(error) => {
                // The worker is already gone; there is nothing left to drain.
                let _ = pipeline.worker.await;
                return match error {
                    ReportingError::QueueClosed => Ok(()),
                    other => Err(other),
                };
            }
        };

        let result = tokio::select! {
            outcome = &mut reply => flatten(outcome),
            _ = sleep(close_timeout) => {
                pipeline.cancel.cancel();
                match timeout(CANCEL_GRACE, &mut reply).await {
                    Ok(outcome) => flatten(outcome),
                    Err(_) => Err(ReportingError::ShutdownTimeout(close_timeout)),
                }
            }
        };

        let _ = pipeline.worker.await;
        result
    }
}

fn flatten(
    outcome: Result<Result<(), ReportingError>, oneshot::error::RecvError>,
) -> Result<(), ReportingError> {
    outcome.unwrap_or(Err(ReportingError::WorkerGone))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_applies_overrides() {
        let session = Session::builder("http://localhost:8585", "sess-1")
            .with_token("dev-token")
            .with_send_strategy(SendStrategy::Single)
            .with_flush_interval(Duration::from_millis(250))
            .with_request_timeout(Duration::from_secs(3))
            .with_close_timeout(Duration::from_secs(7))
            .build()
            .expect("build failed");

        let context = session.context();
        assert_eq!(context.token.as_deref(), Some("dev-token"));
        assert_eq!(context.strategy, SendStrategy::Single);
        assert_eq!(context.flush_interval, Duration::from_millis(250));
        assert_eq!(context.request_timeout, Duration::from_secs(3));
        assert_eq!(context.close_timeout, Duration::from_secs(7));
        assert!(session.reports_enabled());

        session.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_disabled_session_discards_without_machinery() {
        let session = Session::builder("http://localhost:8585", "sess-2")
            .with_reports_disabled(true)
            .build()
            .expect("build failed");

        assert!(!session.reports_enabled());
        assert!(session.handle().is_none());
        assert_eq!(session.state(), DeliveryState::Stopped);

        session
            .report(Report::step("ignored", true))
            .expect("report failed");
        session.flush().await.expect("flush failed");
        session.close().await.expect("close failed");
    }

    #[tokio::test]
    async fn test_invalid_agent_url_fails_construction() {
        let outcome = Session::builder("definitely not a url", "sess-3").build();
        assert!(matches!(outcome, Err(ReportingError::InvalidAgentUrl(_))));
    }
}
