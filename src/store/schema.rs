// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Relational layout of the measurement store
//!
//! ```sql
//! CREATE TABLE machines (
//!     machine_id INTEGER PRIMARY KEY,
//!     machine_name TEXT NOT NULL,
//!     machine_loc TEXT
//! );
//! CREATE TABLE sensors (
//!     sensor_id INTEGER PRIMARY KEY,
//!     machine_id INTEGER REFERENCES machines(machine_id),
//!     sensor_name TEXT NOT NULL,
//!     sensor_type TEXT
//! );
//! CREATE TABLE machine_data (
//!     measurement_id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     sensor_id INTEGER NOT NULL,
//!     time_log DATETIME NOT NULL,
//!     z_vel REAL NOT NULL,
//!     ...                      -- the 30 measured columns, see MEASUREMENT_COLUMNS
//! );
//! ```
//!
//! The column order of `machine_data` is a contract with downstream readers.
//! Changing it or the units requires a coordinated migration.

use rusqlite::{params, Connection};

use crate::config::MachineConfig;

/// Table receiving one row per loaded record.
pub const MEASUREMENT_TABLE: &str = "machine_data";

/// Columns of [`MEASUREMENT_TABLE`] in record field order.
pub const MEASUREMENT_COLUMNS: [&str; 32] = [
    "sensor_id",
    "time_log",
    "z_vel",
    "z_acc",
    "x_vel",
    "x_acc",
    "temp",
    "z_vel_base",
    "z_acc_base",
    "x_vel_base",
    "x_acc_base",
    "z_vel_warn",
    "z_acc_warn",
    "x_vel_warn",
    "x_acc_warn",
    "z_vel_alarm",
    "z_acc_alarm",
    "x_vel_alarm",
    "x_acc_alarm",
    "temp_warn",
    "temp_alarm",
    "motor_run_flag",
    "z_peak_acc",
    "x_peak_acc",
    "z_peak_vel",
    "x_peak_vel",
    "z_rms_low_acc",
    "x_rms_low_acc",
    "z_kurtosis",
    "x_kurtosis",
    "z_crest_factor",
    "x_crest_factor",
];

/// Columns holding scaled values (everything after sensor id and timestamp).
pub fn value_columns() -> &'static [&'static str] {
    &MEASUREMENT_COLUMNS[2..]
}

/// Parameterized INSERT covering all 32 columns.
pub fn insert_statement() -> String {
    let placeholders: Vec<String> = (1..=MEASUREMENT_COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        MEASUREMENT_TABLE,
        MEASUREMENT_COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

/// Create the tables if they do not exist yet.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    let measured: Vec<String> = value_columns()
        .iter()
        .map(|column| format!("{column} REAL NOT NULL"))
        .collect();

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS machines (
            machine_id INTEGER PRIMARY KEY,
            machine_name TEXT NOT NULL,
            machine_loc TEXT
        );
        CREATE TABLE IF NOT EXISTS sensors (
            sensor_id INTEGER PRIMARY KEY,
            machine_id INTEGER REFERENCES machines(machine_id),
            sensor_name TEXT NOT NULL,
            sensor_type TEXT
        );
        CREATE TABLE IF NOT EXISTS {MEASUREMENT_TABLE} (
            measurement_id INTEGER PRIMARY KEY AUTOINCREMENT,
            sensor_id INTEGER NOT NULL,
            time_log DATETIME NOT NULL,
            {}
        );
        CREATE INDEX IF NOT EXISTS idx_machine_data_sensor ON {MEASUREMENT_TABLE}(sensor_id);
        CREATE INDEX IF NOT EXISTS idx_machine_data_time ON {MEASUREMENT_TABLE}(time_log);",
        measured.join(",\n            ")
    ))
}

/// Insert or update a machine row.
pub fn register_machine(
    conn: &Connection,
    machine_id: i64,
    name: &str,
    location: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO machines (machine_id, machine_name, machine_loc) VALUES (?1, ?2, ?3)
         ON CONFLICT(machine_id) DO UPDATE SET machine_name = ?2, machine_loc = ?3",
        params![machine_id, name, location],
    )?;
    Ok(())
}

/// Insert or update a sensor row and attach it to a machine.
pub fn register_sensor(
    conn: &Connection,
    sensor_id: u16,
    machine_id: i64,
    name: &str,
    sensor_type: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO sensors (sensor_id, machine_id, sensor_name, sensor_type) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(sensor_id) DO UPDATE SET machine_id = ?2, sensor_name = ?3, sensor_type = ?4",
        params![sensor_id, machine_id, name, sensor_type],
    )?;
    Ok(())
}

/// Write the configured machines and their sensors, all or nothing.
///
/// Rows not mentioned in `machines` are left alone.
pub fn register_inventory(conn: &Connection, machines: &[MachineConfig]) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for machine in machines {
        register_machine(&tx, machine.id, &machine.name, machine.location.as_deref())?;
        for sensor in &machine.sensors {
            register_sensor(
                &tx,
                sensor.id,
                machine.id,
                &sensor.name,
                sensor.sensor_type.as_deref(),
            )?;
        }
    }
    tx.commit()
}
