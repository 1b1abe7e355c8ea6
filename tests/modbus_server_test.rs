// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the controller simulator
//!
//! These tests start a simulator instance and connect to it with a plain
//! `tokio-modbus` client, checking that it serves the controller register
//! map and rejects what the controller rejects.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::client::{tcp, Client, Reader, Writer};
use tokio_modbus::ExceptionCode;

use cbm_poller::modbus::{sample_register_image, serve, RegisterBlock, SharedRegisters};

/// Test utility function to start a simulator in the background
async fn start_test_server(
    sensor_count: u16,
) -> Result<(SocketAddr, SharedRegisters, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>>
{
    // Use port 0 to let the OS assign an available port
    let socket_addr = SocketAddr::from_str("127.0.0.1:0")?;
    let listener = TcpListener::bind(socket_addr).await?;
    let socket_addr = listener.local_addr()?;

    let registers = Arc::new(Mutex::new(sample_register_image(sensor_count)));
    let served = Arc::clone(&registers);
    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, served).await {
            eprintln!("Server error: {}", e);
        }
    });

    // Give the server a moment to start
    time::sleep(Duration::from_millis(100)).await;

    Ok((socket_addr, registers, handle))
}

#[tokio::test]
async fn test_read_primary_block() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _registers, _server_handle) = start_test_server(2).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let data = ctx
        .read_holding_registers(RegisterBlock::Primary.address(1), 5)
        .await??;
    assert_eq!(data, vec![1000, 100, 500, 50, 2500]);

    let data = ctx
        .read_holding_registers(RegisterBlock::AdditionalStats.address(1), 10)
        .await??;
    assert_eq!(data, vec![1000; 10]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_write_single_register() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, registers, _server_handle) = start_test_server(1).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Stop the motor of sensor 0
    let motor = RegisterBlock::MotorStatus.address(0);
    ctx.write_single_register(motor, 0).await??;

    let data = ctx.read_holding_registers(motor, 1).await??;
    assert_eq!(data, vec![0]);
    assert_eq!(registers.lock().unwrap().get(&motor), Some(&0));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_write_multiple_registers() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _registers, _server_handle) = start_test_server(1).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let values = vec![1500, 150, 700];
    ctx.write_multiple_registers(0, &values).await??;

    let data = ctx.read_holding_registers(0, 3).await??;
    assert_eq!(data, values);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_register_address() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _registers, _server_handle) = start_test_server(1).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Sensor 1 is not part of a one-sensor image
    let result = ctx
        .read_holding_registers(RegisterBlock::Primary.address(1), 5)
        .await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_unsupported_function() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _registers, _server_handle) = start_test_server(1).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Coils are not part of the controller map
    let result = ctx.read_coils(0, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalFunction));

    ctx.disconnect().await?;
    Ok(())
}
