// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport to the Agent's report intake.
//!
//! [`AgentApi`] serializes a batch to UTF-8 JSON and POSTs it to the Agent.
//! The [`ReportSink`] trait is the seam the delivery worker talks through,
//! so tests can substitute a scripted sink without a network.

use crate::config::SessionContext;
use crate::error::ReportingError;
use crate::report::Report;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use tracing::debug;

/// Route for batched reports, relative to the Agent base address.
pub(crate) const BATCH_REPORT_ROUTE: &str = "report/batch";
/// Route for individual reports.
pub(crate) const SINGLE_REPORT_ROUTE: &str = "report";

/// How assembled batches are put on the wire.
///
/// Selected once at construction; replaces behavior override with
/// composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendStrategy {
    /// One POST per batch, body is a JSON array of reports.
    #[default]
    Batch,
    /// One POST per report to the single-report route.
    Single,
}

/// Why a delivery attempt did not succeed.
#[derive(Debug)]
pub enum ShippingError {
    /// The batch could not be serialized. Not transient: the data is
    /// malformed and retrying cannot help.
    Payload(String),
    /// The Agent was unreachable or answered with a non-success status.
    Destination(Option<StatusCode>, String),
}

/// Destination for assembled batches.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Delivers a non-empty batch. In single-report mode the implementation
    /// posts the reports one by one, stopping at the first failure.
    async fn ship(&self, batch: &[Report]) -> Result<(), ShippingError>;
}

/// Production sink: the Agent's HTTP report intake.
#[derive(Debug, Clone)]
pub struct AgentApi {
    client: reqwest::Client,
    batch_url: Url,
    single_url: Url,
    strategy: SendStrategy,
}

impl AgentApi {
    pub fn new(context: &SessionContext) -> Result<Self, ReportingError> {
        let base = context.agent_url.trim_end_matches('/');
        let session = format!("{}/api/development/session/{}", base, context.session_id);
        let batch_url = parse_url(&format!("{session}/{BATCH_REPORT_ROUTE}"))?;
        let single_url = parse_url(&format!("{session}/{SINGLE_REPORT_ROUTE}"))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &context.token {
            let value = HeaderValue::from_str(token).map_err(|_| {
                ReportingError::InvalidConfig("token is not a valid header value".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(context.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ReportingError::InvalidConfig(e.to_string()))?;

        Ok(AgentApi {
            client,
            batch_url,
            single_url,
            strategy: context.strategy,
        })
    }

    async fn post(&self, url: &Url, body: Vec<u8>) -> Result<(), ShippingError> {
        let response = self
            .client
            .post(url.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| ShippingError::Destination(e.status(), e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Agent accepted report payload with {}", status);
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(ShippingError::Destination(Some(status), detail))
    }
}

#[async_trait]
impl ReportSink for AgentApi {
    async fn ship(&self, batch: &[Report]) -> Result<(), ShippingError> {
        match self.strategy {
            SendStrategy::Batch => {
                let body = serde_json::to_vec(batch)
                    .map_err(|e| ShippingError::Payload(e.to_string()))?;
                self.post(&self.batch_url, body).await
            }
            SendStrategy::Single => {
                for report in batch {
                    let body = serde_json::to_vec(report)
                        .map_err(|e| ShippingError::Payload(e.to_string()))?;
                    self.post(&self.single_url, body).await?;
                }
                Ok(())
            }
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, ReportingError> {
    Url::parse(raw).map_err(|_| ReportingError::InvalidAgentUrl(raw.to_string()))
}
