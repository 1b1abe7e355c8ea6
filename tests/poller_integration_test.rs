// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end passes against the controller simulator and a SQLite file

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use rusqlite::Connection;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;

use cbm_poller::config::{Config, MachineConfig, SensorConfig};
use cbm_poller::daemon::{PassAbort, PassReport, Poller};
use cbm_poller::modbus::{sample_register_image, serve, RegisterBlock, SharedRegisters};
use cbm_poller::store::{
    group_by_machine, list_machines, list_sensors, query_measurements, MeasurementFilter,
};

static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    });
}

async fn start_simulator(sensor_count: u16) -> (SocketAddr, SharedRegisters) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let socket_addr = listener.local_addr().unwrap();
    let registers = Arc::new(Mutex::new(sample_register_image(sensor_count)));
    let served = Arc::clone(&registers);
    tokio::spawn(async move {
        let _ = serve(listener, served).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (socket_addr, registers)
}

fn config_for(socket_addr: SocketAddr, dir: &TempDir, sensor_count: u16) -> Config {
    let mut config = Config::default();
    config.controller.address = socket_addr.ip().to_string();
    config.controller.port = socket_addr.port();
    config.controller.timeout_ms = Some(2000);
    config.store.path = dir
        .path()
        .join("cbm.sqlite3")
        .to_string_lossy()
        .to_string();
    config.acquisition.sensor_count = sensor_count;
    config
}

fn stored_rows(config: &Config) -> i64 {
    let conn = Connection::open(&config.store.path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM machine_data", [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn test_healthy_pass_writes_one_row_per_sensor() {
    init_logger();
    let (socket_addr, _registers) = start_simulator(3).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(socket_addr, &dir, 3);
    let (_tx, rx) = watch::channel(false);

    let report = Poller::from_config(&config).run_pass(&rx).await;
    assert_eq!(
        report,
        PassReport {
            attempted: 3,
            loaded: 3,
            rejected: 0,
            abort: None
        }
    );

    let conn = Connection::open(&config.store.path).unwrap();
    let rows = query_measurements(&conn, &MeasurementFilter::default()).unwrap();
    assert_eq!(rows.len(), 3);
    let sensors: Vec<u16> = rows.iter().map(|row| row.sensor_id).collect();
    let mut sorted = sensors.clone();
    sorted.sort();
    assert_eq!(sorted, vec![0, 1, 2]);

    let mut expected = vec![1.0, 0.1, 0.5, 0.05, 25.0];
    expected.extend([0.1; 12]);
    expected.extend([60.0, 80.0, 1.0]);
    expected.extend([1.0; 10]);
    for row in &rows {
        assert_eq!(row.values.to_vec(), expected);
    }

    // No inventory configured: everything lands under "unassigned"
    let grouped = group_by_machine(&rows);
    assert_eq!(grouped["unassigned"].sensors.len(), 3);
}

#[tokio::test]
async fn test_configured_inventory_groups_readings() {
    init_logger();
    let (socket_addr, _registers) = start_simulator(3).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(socket_addr, &dir, 3);
    config.machines = vec![MachineConfig {
        id: 7,
        name: "Compressor A".to_string(),
        location: Some("Hall 2".to_string()),
        sensors: vec![
            SensorConfig {
                id: 0,
                name: "Motor DE".to_string(),
                sensor_type: Some("vibration".to_string()),
            },
            SensorConfig {
                id: 1,
                name: "Motor NDE".to_string(),
                sensor_type: None,
            },
        ],
    }];
    let (_tx, rx) = watch::channel(false);

    let report = Poller::from_config(&config).run_pass(&rx).await;
    assert_eq!(report.loaded, 3);

    let conn = Connection::open(&config.store.path).unwrap();
    let machines = list_machines(&conn).unwrap();
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0].name, "Compressor A");
    let sensors = list_sensors(&conn).unwrap();
    let ids: Vec<u16> = sensors.iter().map(|s| s.sensor_id).collect();
    assert_eq!(ids, vec![0, 1]);

    let rows = query_measurements(&conn, &MeasurementFilter::default()).unwrap();
    let grouped = group_by_machine(&rows);
    assert_eq!(grouped["7"].name.as_deref(), Some("Compressor A"));
    assert_eq!(grouped["7"].sensors.len(), 2);
    assert_eq!(grouped["7"].sensors["0"].name.as_deref(), Some("Motor DE"));
    assert_eq!(grouped["unassigned"].sensors.len(), 1);

    let filter = MeasurementFilter {
        machine_ids: vec![7],
        ..Default::default()
    };
    let rows = query_measurements(&conn, &filter).unwrap();
    let mut sensors: Vec<u16> = rows.iter().map(|row| row.sensor_id).collect();
    sensors.sort();
    assert_eq!(sensors, vec![0, 1]);
}

#[tokio::test]
async fn test_missing_primary_block_aborts_at_next_sensor() {
    init_logger();
    let (socket_addr, registers) = start_simulator(4).await;
    // The controller answers IllegalDataAddress for sensor 1 primary block
    registers
        .lock()
        .unwrap()
        .remove(&RegisterBlock::Primary.address(1));
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(socket_addr, &dir, 4);
    let (_tx, rx) = watch::channel(false);

    let mut poller = Poller::from_config(&config);
    let report = poller.run_pass(&rx).await;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.abort, Some(PassAbort::ControllerLost { at_sensor: 2 }));
    assert_eq!(stored_rows(&config), 1);

    // Next pass reconnects and stops at the same place
    let report = poller.run_pass(&rx).await;
    assert_eq!(report.abort, Some(PassAbort::ControllerLost { at_sensor: 2 }));
    assert_eq!(stored_rows(&config), 2);
}

#[tokio::test]
async fn test_store_without_schema_aborts_pass() {
    init_logger();
    let (socket_addr, _registers) = start_simulator(3).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(socket_addr, &dir, 3);
    config.store.create_schema = false;
    let (_tx, rx) = watch::channel(false);

    let report = Poller::from_config(&config).run_pass(&rx).await;
    assert_eq!(report.loaded, 0);
    assert_eq!(report.abort, Some(PassAbort::StoreLost { at_sensor: 1 }));
}

#[tokio::test]
async fn test_unreachable_controller_is_a_no_op_pass() {
    init_logger();
    // Grab a free port, then release it so nothing listens there
    let socket_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(socket_addr, &dir, 2);
    let (_tx, rx) = watch::channel(false);

    let report = Poller::from_config(&config).run_pass(&rx).await;
    assert_eq!(report.attempted, 0);
    assert_eq!(report.abort, Some(PassAbort::ControllerLost { at_sensor: 0 }));
    assert_eq!(stored_rows(&config), 0);
}
