// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client library that augments browser-automation driver sessions with
//! execution reporting delivered to a local collector (the Agent).
//!
//! Test code emits [`Report`]s as a side effect of user actions; a
//! per-session background worker groups them into bounded batches and POSTs
//! them to the Agent, retrying transient failures and escalating after the
//! consecutive-failure ceiling. Producers never block on network I/O.
//!
//! ```no_run
//! use agent_report_client::{Report, Session};
//!
//! # async fn example() -> Result<(), agent_report_client::ReportingError> {
//! let session = Session::builder("http://localhost:8585", "driver-session-id")
//!     .with_token("dev-token")
//!     .build()?;
//!
//! session.report(Report::step("open login page", true))?;
//! session.report(Report::step("submit credentials", true))?;
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod delivery;
pub mod error;
pub mod queue;
pub mod report;
pub mod session;
pub mod transport;

pub use config::{SessionContext, DEFAULT_MAX_BATCH_SIZE, MAX_BATCH_SIZE_ENV_VAR};
pub use delivery::{DeliveryService, DeliveryState, ReporterHandle, FATAL_CONSECUTIVE_FAILURES};
pub use error::ReportingError;
pub use report::{Report, ReportKind};
pub use session::{Session, SessionBuilder};
pub use transport::{AgentApi, ReportSink, SendStrategy, ShippingError};
