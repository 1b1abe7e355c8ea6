// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Read side of the measurement store
//!
//! Stored rows are selected with a [`MeasurementFilter`] and reshaped by
//! [`group_by_machine`] into the nested machine/sensor layout served to
//! dashboards. [`list_machines`] and [`list_sensors`] return the inventory
//! itself. The grouped layout looks like:
//!
//! ```json
//! {
//!   "7": {
//!     "compressorname": "Compressor A",
//!     "loc": "Hall 2",
//!     "sensors": {
//!       "0": { "asensorname": "Motor DE", "data": [ { "timestamp": "2024-05-17 08:30:00", "z-vel": 1.0, ... } ] }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params_from_iter, Connection, Row, ToSql};
use serde::Serialize;

use super::schema::{value_columns, MEASUREMENT_TABLE};
use crate::acquisition::RECORD_VALUE_COUNT;

/// Machine key used for sensors that are not attached to any machine.
pub const UNASSIGNED_MACHINE: &str = "unassigned";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Optional restrictions on stored readings. Empty sets mean "all".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementFilter {
    pub sensor_ids: Vec<u16>,
    pub machine_ids: Vec<i64>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// One `machine_data` row joined with its sensor and machine metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMeasurement {
    pub measurement_id: i64,
    pub sensor_id: u16,
    pub sensor_name: Option<String>,
    pub machine_id: Option<i64>,
    pub machine_name: Option<String>,
    pub machine_loc: Option<String>,
    pub time_log: NaiveDateTime,
    pub values: [f64; RECORD_VALUE_COUNT],
}

impl StoredMeasurement {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut values = [0.0; RECORD_VALUE_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            *value = row.get(7 + i)?;
        }
        Ok(Self {
            measurement_id: row.get(0)?,
            sensor_id: row.get(1)?,
            sensor_name: row.get(2)?,
            machine_id: row.get(3)?,
            machine_name: row.get(4)?,
            machine_loc: row.get(5)?,
            time_log: row.get(6)?,
            values,
        })
    }
}

/// Build the SELECT for `filter` together with its bound parameters.
fn select_statement(filter: &MeasurementFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let measured: Vec<String> = value_columns()
        .iter()
        .map(|column| format!("d.{column}"))
        .collect();
    let mut sql = format!(
        "SELECT d.measurement_id, d.sensor_id, s.sensor_name, s.machine_id, m.machine_name, \
         m.machine_loc, d.time_log, {} \
         FROM {MEASUREMENT_TABLE} d \
         LEFT JOIN sensors s ON s.sensor_id = d.sensor_id \
         LEFT JOIN machines m ON m.machine_id = s.machine_id \
         WHERE 1=1",
        measured.join(", ")
    );
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if !filter.sensor_ids.is_empty() {
        let marks = vec!["?"; filter.sensor_ids.len()].join(",");
        sql.push_str(&format!(" AND d.sensor_id IN ({marks})"));
        params.extend(
            filter
                .sensor_ids
                .iter()
                .map(|id| Box::new(*id) as Box<dyn ToSql>),
        );
    }
    if !filter.machine_ids.is_empty() {
        let marks = vec!["?"; filter.machine_ids.len()].join(",");
        sql.push_str(&format!(" AND s.machine_id IN ({marks})"));
        params.extend(
            filter
                .machine_ids
                .iter()
                .map(|id| Box::new(*id) as Box<dyn ToSql>),
        );
    }
    if let Some(start) = filter.start {
        sql.push_str(" AND d.time_log >= ?");
        params.push(Box::new(start));
    }
    if let Some(end) = filter.end {
        sql.push_str(" AND d.time_log <= ?");
        params.push(Box::new(end));
    }
    sql.push_str(" ORDER BY d.time_log, d.measurement_id");
    (sql, params)
}

/// Stored readings matching `filter`, oldest first.
pub fn query_measurements(
    conn: &Connection,
    filter: &MeasurementFilter,
) -> Result<Vec<StoredMeasurement>> {
    let (sql, params) = select_statement(filter);
    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare measurement query")?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), StoredMeasurement::from_row)
        .context("Failed to run measurement query")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to decode stored measurement")
}

/// One row of the `machines` table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MachineInfo {
    #[serde(rename = "machineid")]
    pub machine_id: i64,
    #[serde(rename = "machinename")]
    pub name: String,
    #[serde(rename = "machineloc")]
    pub location: Option<String>,
}

/// One row of the `sensors` table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SensorInfo {
    #[serde(rename = "sensorid")]
    pub sensor_id: u16,
    #[serde(rename = "machineid")]
    pub machine_id: Option<i64>,
    #[serde(rename = "sensorname")]
    pub name: String,
    #[serde(rename = "sensortype")]
    pub sensor_type: Option<String>,
}

/// Every registered machine, by id.
pub fn list_machines(conn: &Connection) -> Result<Vec<MachineInfo>> {
    let mut stmt = conn
        .prepare("SELECT machine_id, machine_name, machine_loc FROM machines ORDER BY machine_id")
        .context("Failed to prepare machine query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MachineInfo {
                machine_id: row.get(0)?,
                name: row.get(1)?,
                location: row.get(2)?,
            })
        })
        .context("Failed to run machine query")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to decode machine row")
}

/// Every registered sensor, by id.
pub fn list_sensors(conn: &Connection) -> Result<Vec<SensorInfo>> {
    let mut stmt = conn
        .prepare(
            "SELECT sensor_id, machine_id, sensor_name, sensor_type FROM sensors ORDER BY sensor_id",
        )
        .context("Failed to prepare sensor query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SensorInfo {
                sensor_id: row.get(0)?,
                machine_id: row.get(1)?,
                name: row.get(2)?,
                sensor_type: row.get(3)?,
            })
        })
        .context("Failed to run sensor query")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to decode sensor row")
}

/// One reading as served to consumers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reading {
    pub timestamp: String,
    #[serde(rename = "z-vel")]
    pub z_vel: f64,
    #[serde(rename = "z-acc")]
    pub z_acc: f64,
    #[serde(rename = "x-vel")]
    pub x_vel: f64,
    #[serde(rename = "x-acc")]
    pub x_acc: f64,
    pub temp: f64,
    #[serde(rename = "z-vel-baseline")]
    pub z_vel_baseline: f64,
    #[serde(rename = "z-acc-baseline")]
    pub z_acc_baseline: f64,
    #[serde(rename = "x-vel-baseline")]
    pub x_vel_baseline: f64,
    #[serde(rename = "x-acc-baseline")]
    pub x_acc_baseline: f64,
    #[serde(rename = "z-vel-warning")]
    pub z_vel_warning: f64,
    #[serde(rename = "z-acc-warning")]
    pub z_acc_warning: f64,
    #[serde(rename = "x-vel-warning")]
    pub x_vel_warning: f64,
    #[serde(rename = "x-acc-warning")]
    pub x_acc_warning: f64,
    #[serde(rename = "z-vel-alarm")]
    pub z_vel_alarm: f64,
    #[serde(rename = "z-acc-alarm")]
    pub z_acc_alarm: f64,
    #[serde(rename = "x-vel-alarm")]
    pub x_vel_alarm: f64,
    #[serde(rename = "x-acc-alarm")]
    pub x_acc_alarm: f64,
    #[serde(rename = "temp-warning")]
    pub temp_warning: f64,
    #[serde(rename = "temp-alarm")]
    pub temp_alarm: f64,
    #[serde(rename = "motor-run-flag")]
    pub motor_run_flag: f64,
    #[serde(rename = "z-peak-acc")]
    pub z_peak_acc: f64,
    #[serde(rename = "x-peak-acc")]
    pub x_peak_acc: f64,
    #[serde(rename = "z-peak-vel")]
    pub z_peak_vel: f64,
    #[serde(rename = "x-peak-vel")]
    pub x_peak_vel: f64,
    #[serde(rename = "z-rms-low-acc")]
    pub z_rms_low_acc: f64,
    #[serde(rename = "x-rms-low-acc")]
    pub x_rms_low_acc: f64,
    #[serde(rename = "z-kurtosis")]
    pub z_kurtosis: f64,
    #[serde(rename = "x-kurtosis")]
    pub x_kurtosis: f64,
    #[serde(rename = "z-crest-factor")]
    pub z_crest_factor: f64,
    #[serde(rename = "x-crest-factor")]
    pub x_crest_factor: f64,
}

impl From<&StoredMeasurement> for Reading {
    fn from(row: &StoredMeasurement) -> Self {
        let v = &row.values;
        Self {
            timestamp: row.time_log.format(TIMESTAMP_FORMAT).to_string(),
            z_vel: v[0],
            z_acc: v[1],
            x_vel: v[2],
            x_acc: v[3],
            temp: v[4],
            z_vel_baseline: v[5],
            z_acc_baseline: v[6],
            x_vel_baseline: v[7],
            x_acc_baseline: v[8],
            z_vel_warning: v[9],
            z_acc_warning: v[10],
            x_vel_warning: v[11],
            x_acc_warning: v[12],
            z_vel_alarm: v[13],
            z_acc_alarm: v[14],
            x_vel_alarm: v[15],
            x_acc_alarm: v[16],
            temp_warning: v[17],
            temp_alarm: v[18],
            motor_run_flag: v[19],
            z_peak_acc: v[20],
            x_peak_acc: v[21],
            z_peak_vel: v[22],
            x_peak_vel: v[23],
            z_rms_low_acc: v[24],
            x_rms_low_acc: v[25],
            z_kurtosis: v[26],
            x_kurtosis: v[27],
            z_crest_factor: v[28],
            x_crest_factor: v[29],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SensorGroup {
    #[serde(rename = "asensorname")]
    pub name: Option<String>,
    pub data: Vec<Reading>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MachineGroup {
    #[serde(rename = "compressorname")]
    pub name: Option<String>,
    #[serde(rename = "loc")]
    pub location: Option<String>,
    pub sensors: BTreeMap<String, SensorGroup>,
}

/// Nest rows as machine -> sensor -> readings, keeping row order inside each sensor.
pub fn group_by_machine(rows: &[StoredMeasurement]) -> BTreeMap<String, MachineGroup> {
    let mut grouped: BTreeMap<String, MachineGroup> = BTreeMap::new();
    for row in rows {
        let machine_key = row
            .machine_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| UNASSIGNED_MACHINE.to_string());
        let machine = grouped.entry(machine_key).or_insert_with(|| MachineGroup {
            name: row.machine_name.clone(),
            location: row.machine_loc.clone(),
            sensors: BTreeMap::new(),
        });
        let sensor = machine
            .sensors
            .entry(row.sensor_id.to_string())
            .or_insert_with(|| SensorGroup {
                name: row.sensor_name.clone(),
                data: Vec::new(),
            });
        sensor.data.push(Reading::from(row));
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SensorRecord;
    use crate::store::schema::{ensure_schema, insert_statement, register_machine, register_sensor};
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn insert(conn: &Connection, sensor_index: u16, captured_at: NaiveDateTime, first: f64) {
        let mut values = [0.0; RECORD_VALUE_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            *value = first + i as f64;
        }
        let record = SensorRecord {
            sensor_index,
            captured_at,
            values,
        };
        let mut params: Vec<&dyn ToSql> = vec![&record.sensor_index, &record.captured_at];
        params.extend(record.values.iter().map(|value| value as &dyn ToSql));
        conn.execute(&insert_statement(), params.as_slice()).unwrap();
    }

    fn populated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        register_machine(&conn, 7, "Compressor A", Some("Hall 2")).unwrap();
        register_sensor(&conn, 0, 7, "Motor DE", Some("vibration")).unwrap();
        register_sensor(&conn, 1, 7, "Motor NDE", None).unwrap();
        insert(&conn, 1, at(10), 100.0);
        insert(&conn, 0, at(9), 0.0);
        insert(&conn, 0, at(11), 200.0);
        // sensor 5 has no sensors row
        insert(&conn, 5, at(12), 300.0);
        conn
    }

    #[test]
    fn test_unfiltered_query_is_time_ordered() {
        let conn = populated();
        let rows = query_measurements(&conn, &MeasurementFilter::default()).unwrap();
        let times: Vec<NaiveDateTime> = rows.iter().map(|row| row.time_log).collect();
        assert_eq!(times, vec![at(9), at(10), at(11), at(12)]);
        assert_eq!(rows[0].values[29], 29.0);
        assert_eq!(rows[0].machine_name.as_deref(), Some("Compressor A"));
        assert_eq!(rows[3].machine_id, None);
    }

    #[test]
    fn test_filters_combine() {
        let conn = populated();
        let filter = MeasurementFilter {
            sensor_ids: vec![0, 5],
            start: Some(at(10)),
            ..Default::default()
        };
        let rows = query_measurements(&conn, &filter).unwrap();
        let sensors: Vec<u16> = rows.iter().map(|row| row.sensor_id).collect();
        assert_eq!(sensors, vec![0, 5]);

        let filter = MeasurementFilter {
            machine_ids: vec![7],
            end: Some(at(10)),
            ..Default::default()
        };
        let rows = query_measurements(&conn, &filter).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_group_by_machine_layout() {
        let conn = populated();
        let rows = query_measurements(&conn, &MeasurementFilter::default()).unwrap();
        let grouped = group_by_machine(&rows);

        assert_eq!(grouped.len(), 2);
        let machine = &grouped["7"];
        assert_eq!(machine.sensors["0"].data.len(), 2);
        assert_eq!(machine.sensors["0"].data[0].timestamp, "2024-05-17 09:00:00");
        assert_eq!(machine.sensors["0"].data[1].z_vel, 200.0);
        assert_eq!(grouped[UNASSIGNED_MACHINE].sensors["5"].name, None);

        let json = serde_json::to_value(&grouped).unwrap();
        assert_eq!(json["7"]["compressorname"], "Compressor A");
        assert_eq!(json["7"]["loc"], "Hall 2");
        assert_eq!(json["7"]["sensors"]["1"]["asensorname"], "Motor NDE");
        let reading = &json["7"]["sensors"]["1"]["data"][0];
        assert_eq!(reading["z-vel"], 100.0);
        assert_eq!(reading["temp-alarm"], 118.0);
        assert_eq!(reading["motor-run-flag"], 119.0);
        assert_eq!(reading["x-crest-factor"], 129.0);
    }

    #[test]
    fn test_inventory_listings() {
        let conn = populated();
        register_machine(&conn, 3, "Pump", None).unwrap();

        let machines = list_machines(&conn).unwrap();
        let ids: Vec<i64> = machines.iter().map(|m| m.machine_id).collect();
        assert_eq!(ids, vec![3, 7]);
        assert_eq!(machines[1].location.as_deref(), Some("Hall 2"));

        let sensors = list_sensors(&conn).unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].sensor_type.as_deref(), Some("vibration"));
        assert_eq!(sensors[1].machine_id, Some(7));

        let json = serde_json::to_value(&sensors).unwrap();
        assert_eq!(json[1]["sensorname"], "Motor NDE");
        assert_eq!(json[1]["sensortype"], serde_json::Value::Null);
    }
}
