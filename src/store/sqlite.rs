// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! SQLite measurement store

use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::{Connection, ToSql};

use super::schema::{ensure_schema, insert_statement, register_inventory};
use super::{MeasurementStore, StoreConnectivityFault};
use crate::acquisition::SensorRecord;
use crate::config::MachineConfig;

/// Measurement store writing to a SQLite database file.
///
/// A new connection is opened by every `connect()` and dropped by
/// `disconnect()`; nothing is kept between passes.
pub struct SqliteStore {
    path: PathBuf,
    create_schema: bool,
    inventory: Vec<MachineConfig>,
    conn: Option<Connection>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            create_schema: true,
            inventory: Vec::new(),
            conn: None,
        }
    }

    /// Whether `connect()` runs the `CREATE TABLE IF NOT EXISTS` statements.
    pub fn with_schema_creation(mut self, create_schema: bool) -> Self {
        self.create_schema = create_schema;
        self
    }

    /// Machines and sensors written to the store on every `connect()`.
    pub fn with_inventory(mut self, machines: Vec<MachineConfig>) -> Self {
        self.inventory = machines;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MeasurementStore for SqliteStore {
    fn connect(&mut self) -> Result<(), StoreConnectivityFault> {
        debug!("Opening SQLite database at {}", self.path.display());
        let conn = Connection::open(&self.path).map_err(|e| StoreConnectivityFault::Open {
            target: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        if self.create_schema {
            ensure_schema(&conn).map_err(|e| StoreConnectivityFault::Schema {
                reason: e.to_string(),
            })?;
        }

        if !self.inventory.is_empty() {
            register_inventory(&conn, &self.inventory).map_err(|e| {
                StoreConnectivityFault::Inventory {
                    reason: e.to_string(),
                }
            })?;
            debug!("Registered {} machines", self.inventory.len());
        }

        self.conn = Some(conn);
        Ok(())
    }

    fn insert(&mut self, record: &SensorRecord) -> Result<(), StoreConnectivityFault> {
        let conn = self
            .conn
            .as_mut()
            .ok_or(StoreConnectivityFault::NotConnected)?;

        let tx = conn
            .transaction()
            .map_err(|e| StoreConnectivityFault::Insert {
                sensor_index: record.sensor_index,
                reason: e.to_string(),
            })?;

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(record.values.len() + 2);
        params.push(&record.sensor_index);
        params.push(&record.captured_at);
        params.extend(record.values.iter().map(|value| value as &dyn ToSql));

        tx.execute(&insert_statement(), params.as_slice())
            .map_err(|e| StoreConnectivityFault::Insert {
                sensor_index: record.sensor_index,
                reason: e.to_string(),
            })?;

        tx.commit().map_err(|e| StoreConnectivityFault::Commit {
            sensor_index: record.sensor_index,
            reason: e.to_string(),
        })
    }

    fn disconnect(&mut self) -> Result<(), StoreConnectivityFault> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| StoreConnectivityFault::Close {
                    reason: e.to_string(),
                }),
            None => Ok(()),
        }
    }
}
