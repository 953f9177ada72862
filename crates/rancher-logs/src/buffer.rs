// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::record::LogRecord;

/// Bounded, append-only batch of records waiting for the next flush.
#[derive(Debug)]
pub struct Buffer {
    records: Mutex<Vec<LogRecord>>,
    capacity: usize,
}

impl Buffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Buffer {
            records: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    fn records(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `record` and returns the new length.
    pub fn push(&self, record: LogRecord) -> usize {
        let mut records = self.records();
        records.push(record);
        records.len()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Swaps the current records for an empty buffer of the same capacity.
    ///
    /// Returns `None`, and keeps the current allocation, when nothing is buffered.
    pub fn detach(&self) -> Option<Vec<LogRecord>> {
        let mut records = self.records();
        if records.is_empty() {
            return None;
        }
        Some(mem::replace(
            &mut *records,
            Vec::with_capacity(self.capacity),
        ))
    }
}
