// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Report value type and its serialization contract.
//!
//! A [`Report`] describes one observable test event. Reports are immutable
//! once constructed and carry their creation timestamp; ownership transfers
//! to the delivery pipeline on enqueue.
//!
//! On the wire a report is a JSON object with its discriminator, payload
//! fields, and timestamp:
//!
//! ```json
//! {"type":"Step","timestamp":1717171717000,"description":"click login","passed":true}
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Discriminator for the kind of event a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportKind {
    /// A raw automation-engine command and its result.
    DriverCommand,
    /// A logical test step.
    Step,
    /// A test start/end marker.
    Test,
}

/// One discrete test-execution event to be recorded by the Agent.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(rename = "type")]
    kind: ReportKind,
    /// Creation time, epoch milliseconds.
    timestamp: i64,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Report {
    /// Creates a report of the given kind with an arbitrary payload.
    pub fn new(kind: ReportKind, fields: Map<String, Value>) -> Self {
        Report {
            kind,
            timestamp: epoch_millis(),
            fields,
        }
    }

    /// Creates a step report.
    pub fn step(description: impl Into<String>, passed: bool) -> Self {
        let mut fields = Map::new();
        fields.insert("description".to_string(), Value::String(description.into()));
        fields.insert("passed".to_string(), Value::Bool(passed));
        Self::new(ReportKind::Step, fields)
    }

    /// Creates a test start/end marker report.
    pub fn test(name: impl Into<String>, passed: bool) -> Self {
        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::String(name.into()));
        fields.insert("passed".to_string(), Value::Bool(passed));
        Self::new(ReportKind::Test, fields)
    }

    /// Creates a driver command report.
    pub fn driver_command(command: impl Into<String>, passed: bool) -> Self {
        let mut fields = Map::new();
        fields.insert("commandName".to_string(), Value::String(command.into()));
        fields.insert("passed".to_string(), Value::Bool(passed));
        Self::new(ReportKind::DriverCommand, fields)
    }

    /// Attaches an extra payload field. Consumes the report, so a report
    /// already handed to the queue can not be altered.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Creation time in epoch milliseconds.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
