// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! FIFO buffer of pending reports and batch assembly.
//!
//! The buffer is owned by the delivery worker; producers reach it only
//! through the worker's command channel, so none of these operations need
//! internal locking.

use crate::report::Report;
use std::collections::VecDeque;

/// Pending reports in enqueue order. Unbounded: the Agent runs next to the
/// test process and is expected to be reachable most of the time, and
/// dropping reports silently is not an option.
#[derive(Debug, Default)]
pub struct ReportQueue {
    items: VecDeque<Report>,
}

impl ReportQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts at the tail.
    pub fn push(&mut self, report: Report) {
        self.items.push_back(report);
    }

    /// Re-inserts a failed batch at the head, preserving its internal order,
    /// so a later cycle retries the same reports first.
    pub fn push_front_batch(&mut self, batch: Vec<Report>) {
        for report in batch.into_iter().rev() {
            self.items.push_front(report);
        }
    }

    /// Drains up to `max` items from the head without waiting for more to
    /// arrive. A short batch is returned as-is; an empty queue yields an
    /// empty vector, which is never sent.
    pub fn next_batch(&mut self, max: usize) -> Vec<Report> {
        let take = max.min(self.items.len());
        self.items.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
