// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-memory measurement store for tests and dry runs
//!
//! Clones share one state, so a test can keep a handle to inject faults and
//! inspect the rows after the store has been boxed into a
//! [`Loader`](super::Loader).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{MeasurementStore, StoreConnectivityFault};
use crate::acquisition::SensorRecord;

#[derive(Debug, Default)]
struct MockState {
    rows: Vec<SensorRecord>,
    refuse_connect: bool,
    fail_inserts: bool,
    fail_disconnects: bool,
    open: bool,
    connects: usize,
    disconnects: usize,
    disconnect_calls: usize,
    inserts_attempted: usize,
}

/// Measurement store keeping rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MockMeasurementStore {
    state: Arc<Mutex<MockState>>,
}

impl MockMeasurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state().refuse_connect = refuse;
    }

    /// Every insert fails until switched off again.
    pub fn fail_inserts(&self, fail: bool) {
        self.state().fail_inserts = fail;
    }

    /// Every disconnect reports an error, after releasing the connection.
    pub fn fail_disconnects(&self, fail: bool) {
        self.state().fail_disconnects = fail;
    }

    pub fn rows(&self) -> Vec<SensorRecord> {
        self.state().rows.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    /// Disconnects that actually released an open connection.
    pub fn disconnect_count(&self) -> usize {
        self.state().disconnects
    }

    /// Every disconnect call, including those with nothing open.
    pub fn disconnect_calls(&self) -> usize {
        self.state().disconnect_calls
    }

    pub fn inserts_attempted(&self) -> usize {
        self.state().inserts_attempted
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }
}

impl MeasurementStore for MockMeasurementStore {
    fn connect(&mut self) -> Result<(), StoreConnectivityFault> {
        let mut state = self.state();
        state.connects += 1;
        if state.refuse_connect {
            return Err(StoreConnectivityFault::Open {
                target: "mock".to_string(),
                reason: "unable to open database file".to_string(),
            });
        }
        state.open = true;
        Ok(())
    }

    fn insert(&mut self, record: &SensorRecord) -> Result<(), StoreConnectivityFault> {
        let mut state = self.state();
        if !state.open {
            return Err(StoreConnectivityFault::NotConnected);
        }
        state.inserts_attempted += 1;
        if state.fail_inserts {
            return Err(StoreConnectivityFault::Insert {
                sensor_index: record.sensor_index,
                reason: "disk I/O error".to_string(),
            });
        }
        state.rows.push(record.clone());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), StoreConnectivityFault> {
        let mut state = self.state();
        state.disconnect_calls += 1;
        if state.open {
            state.open = false;
            state.disconnects += 1;
        }
        if state.fail_disconnects {
            return Err(StoreConnectivityFault::Close {
                reason: "database is locked".to_string(),
            });
        }
        Ok(())
    }
}
