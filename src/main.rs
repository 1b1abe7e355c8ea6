// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the condition-monitoring poller
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use log::info;
use rusqlite::{Connection, OpenFlags};
use tokio::signal;
use tokio::sync::watch;

use cbm_poller::config::{self, Config};
use cbm_poller::daemon::{Daemon, Poller};
use cbm_poller::store::{
    group_by_machine, list_machines, list_sensors, query_measurements, MeasurementFilter,
};

/// Reads vibration and temperature telemetry from a Modbus TCP controller
/// and stores it in SQLite
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Controller host name or IP address
    #[arg(long)]
    controller_address: Option<String>,

    /// Controller Modbus TCP port
    #[arg(long)]
    controller_port: Option<u16>,

    /// Number of sensors to poll
    #[arg(long)]
    sensor_count: Option<u16>,

    /// Seconds between two passes
    #[arg(long)]
    interval_secs: Option<u64>,

    /// SQLite database path
    #[arg(long)]
    store_path: Option<String>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Print stored readings as JSON and exit
    #[arg(long)]
    query: bool,

    /// Print registered machines as JSON and exit
    #[arg(long, conflicts_with_all = ["query", "list_sensors"])]
    list_machines: bool,

    /// Print registered sensors as JSON and exit
    #[arg(long, conflicts_with = "query")]
    list_sensors: bool,

    /// Restrict --query to these sensors (comma separated)
    #[arg(long, value_delimiter = ',', requires = "query")]
    sensor_ids: Vec<u16>,

    /// Restrict --query to these machines (comma separated)
    #[arg(long, value_delimiter = ',', requires = "query")]
    machine_ids: Vec<i64>,

    /// Earliest reading for --query ("YYYY-MM-DD HH:MM:SS")
    #[arg(long, value_parser = parse_timestamp, requires = "query")]
    start: Option<NaiveDateTime>,

    /// Latest reading for --query ("YYYY-MM-DD HH:MM:SS")
    #[arg(long, value_parser = parse_timestamp, requires = "query")]
    end: Option<NaiveDateTime>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("expected \"YYYY-MM-DD HH:MM:SS\": {e}"))
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open measurement store at {:?}", path))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to format query result")?
    );
    Ok(())
}

/// Print readings stored in `path` that match `filter`, grouped by machine.
fn print_stored_readings(path: &Path, filter: &MeasurementFilter) -> Result<()> {
    let conn = open_read_only(path)?;
    let rows = query_measurements(&conn, filter)?;
    info!("{} stored readings match", rows.len());
    print_json(&group_by_machine(&rows))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.controller_address.clone(),
        args.controller_port,
        args.sensor_count,
        args.interval_secs,
        args.store_path.clone(),
    );
    config::utils::validate_specific_rules(&config)?;

    if args.list_machines {
        let conn = open_read_only(Path::new(&config.store.path))?;
        return print_json(&list_machines(&conn)?);
    }

    if args.list_sensors {
        let conn = open_read_only(Path::new(&config.store.path))?;
        return print_json(&list_sensors(&conn)?);
    }

    if args.query {
        let filter = MeasurementFilter {
            sensor_ids: args.sensor_ids,
            machine_ids: args.machine_ids,
            start: args.start,
            end: args.end,
        };
        return print_stored_readings(Path::new(&config.store.path), &filter);
    }

    if args.once {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                shutdown_tx.send_replace(true);
            }
        });
        let report = Poller::from_config(&config).run_pass(&shutdown_rx).await;
        println!("{}", report);
        return Ok(());
    }

    info!(
        "Polling controller {}:{} into {}",
        config.controller.address, config.controller.port, config.store.path
    );
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, terminating daemon"),
        Err(err) => eprintln!("Error waiting for shutdown signal: {}", err),
    }
    daemon.shutdown();
    daemon.join().await?;

    Ok(())
}
