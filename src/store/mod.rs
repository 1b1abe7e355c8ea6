// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Measurement persistence
//!
//! The [`Loader`] validates assembled records and hands complete ones to a
//! [`MeasurementStore`], one transaction per record. Faults never escape as
//! errors: they come back as a [`LoadOutcome`] and flip the loader's
//! [`Connectivity`], which the poller checks before the next sensor.
//!
//! - [`sqlite`]: the SQLite store used in production.
//! - [`mock`]: an in-memory store for tests.
//! - [`schema`]: table layout and provisioning.
//! - [`query`]: filtered reads for downstream consumers.

pub mod mock;
pub mod query;
pub mod schema;
pub mod sqlite;

use log::{debug, error, warn};
use thiserror::Error;

use crate::acquisition::{RecordBuilder, SensorRecord, ValidationFault};
use crate::config::{MachineConfig, StoreConfig};
use crate::utility::{CloseOutcome, Connectivity};

pub use mock::MockMeasurementStore;
pub use query::{
    group_by_machine, list_machines, list_sensors, query_measurements, MachineInfo,
    MeasurementFilter, SensorInfo, StoredMeasurement,
};
pub use sqlite::SqliteStore;

/// Open, insert or commit failure on the store link.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreConnectivityFault {
    #[error("Failed to open measurement store {target}: {reason}")]
    Open { target: String, reason: String },

    #[error("Failed to prepare measurement schema: {reason}")]
    Schema { reason: String },

    #[error("Failed to register machine inventory: {reason}")]
    Inventory { reason: String },

    #[error("Failed to insert record of sensor {sensor_index}: {reason}")]
    Insert { sensor_index: u16, reason: String },

    #[error("Failed to commit record of sensor {sensor_index}: {reason}")]
    Commit { sensor_index: u16, reason: String },

    #[error("Failed to close measurement store: {reason}")]
    Close { reason: String },

    #[error("Measurement store is not connected")]
    NotConnected,
}

/// Backend receiving validated records.
pub trait MeasurementStore: Send {
    /// Open a connection.
    fn connect(&mut self) -> Result<(), StoreConnectivityFault>;

    /// Insert one record and commit, atomically.
    fn insert(&mut self, record: &SensorRecord) -> Result<(), StoreConnectivityFault>;

    /// Release the connection. Must be safe to call when nothing is open.
    fn disconnect(&mut self) -> Result<(), StoreConnectivityFault>;
}

/// What happened to one record handed to [`Loader::load`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The row was inserted and committed.
    Inserted { sensor_index: u16 },
    /// The record failed validation; the store was not contacted.
    Rejected(ValidationFault),
    /// The store failed; the loader is now faulted.
    Failed(StoreConnectivityFault),
}

/// One store session plus its connectivity state.
pub struct Loader {
    store: Box<dyn MeasurementStore>,
    connectivity: Connectivity,
    session_open: bool,
}

impl Loader {
    pub fn new(store: Box<dyn MeasurementStore>) -> Self {
        Self {
            store,
            connectivity: Connectivity::Disconnected,
            session_open: false,
        }
    }

    /// Build a loader writing to the configured SQLite database and
    /// registering `machines` on every connect.
    pub fn from_config(config: &StoreConfig, machines: &[MachineConfig]) -> Self {
        let store = SqliteStore::new(&config.path)
            .with_schema_creation(config.create_schema)
            .with_inventory(machines.to_vec());
        Self::new(Box::new(store))
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.is_connected()
    }

    /// Open a fresh session. A session still held from before is released first.
    pub fn connect(&mut self) -> Result<(), StoreConnectivityFault> {
        if self.session_open {
            self.close();
        }
        match self.store.connect() {
            Ok(()) => {
                debug!("Connected to measurement store");
                self.session_open = true;
                self.connectivity = Connectivity::Connected;
                Ok(())
            }
            Err(fault) => {
                error!("{}", fault);
                // connect may have left a half-open handle behind
                if let Err(cleanup) = self.store.disconnect() {
                    debug!("Ignoring error while releasing failed store session: {}", cleanup);
                }
                self.connectivity = Connectivity::Faulted;
                Err(fault)
            }
        }
    }

    /// Validate `record` and persist it if it is complete.
    pub fn load(&mut self, record: &RecordBuilder) -> LoadOutcome {
        let record = match record.build() {
            Ok(record) => record,
            Err(fault) => {
                warn!(
                    "Discarding record of sensor {}: {}",
                    record
                        .sensor_index()
                        .map(|index| index.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    fault
                );
                return LoadOutcome::Rejected(fault);
            }
        };

        if !self.is_connected() {
            return LoadOutcome::Failed(StoreConnectivityFault::NotConnected);
        }

        match self.store.insert(&record) {
            Ok(()) => {
                debug!(
                    "Loaded sensor {} captured at {}",
                    record.sensor_index, record.captured_at
                );
                LoadOutcome::Inserted {
                    sensor_index: record.sensor_index,
                }
            }
            Err(fault) => {
                error!("{}", fault);
                self.connectivity = Connectivity::Faulted;
                LoadOutcome::Failed(fault)
            }
        }
    }

    /// Release the session if one is held. Idempotent, never fails.
    pub fn close(&mut self) -> CloseOutcome {
        let outcome = if self.session_open {
            self.session_open = false;
            match self.store.disconnect() {
                Ok(()) => CloseOutcome::Released,
                Err(fault) => {
                    debug!("Ignoring error while closing measurement store: {}", fault);
                    CloseOutcome::ReleasedWithError(fault.to_string())
                }
            }
        } else {
            CloseOutcome::AlreadyClosed
        };
        self.connectivity = Connectivity::Disconnected;
        outcome
    }
}
