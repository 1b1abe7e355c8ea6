// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio::signal;

use cbm_poller::modbus::{sample_register_image, serve, RegisterBlock};

/// Modbus TCP server exposing a synthetic condition-monitoring register map
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Port to listen on
    #[clap(long, default_value = "5020")]
    port: u16,

    /// Number of sensors present in the register image
    #[clap(long, default_value = "16")]
    sensor_count: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    if let Some(block) = RegisterBlock::ALL
        .into_iter()
        .find(|block| block.last_register(args.sensor_count) > u32::from(u16::MAX))
    {
        anyhow::bail!(
            "{} sensors do not fit the register space ({} block overflows)",
            args.sensor_count,
            block
        );
    }

    let socket_addr = format!("{}:{}", args.address, args.port);
    let listener = TcpListener::bind(&socket_addr)
        .await
        .with_context(|| format!("Failed to bind {}", socket_addr))?;

    let registers = Arc::new(Mutex::new(sample_register_image(args.sensor_count)));
    info!(
        "Serving {} sensors on {}, press Ctrl+C to stop",
        args.sensor_count, socket_addr
    );

    tokio::select! {
        result = serve(listener, registers) => result.context("Modbus server failed")?,
        _ = signal::ctrl_c() => info!("Received shutdown signal"),
    }

    Ok(())
}
