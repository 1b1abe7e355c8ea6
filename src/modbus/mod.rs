// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module talks Modbus TCP to the condition-monitoring controller. The
//! poller is the Modbus client: it reads holding registers only.
//!
//! ## Key Components
//!
//! - [`RegisterBlock`]: the per-sensor register map and scaling rules.
//! - [`ProtocolClient`]: one controller session with its connectivity state.
//! - [`ModbusTcpTransport`]: `tokio-modbus` transport used in production.
//! - [`MockRegisterTransport`]: in-memory transport for tests.
//! - [`ControllerSimulator`]: a Modbus TCP server exposing the same register
//!   map, used by the `plc_simulator` binary.
//!
//! ## Register Map
//!
//! Sensor `i` is read from six blocks of holding registers:
//!
//! - Registers `5i..5i+4`: z-vel, z-acc, x-vel, x-acc (÷1000), temperature (÷100)
//! - Registers `5180+12i..`: 12 vibration thresholds (÷1000)
//! - Register `7680+i`: temperature warning (°C)
//! - Register `7720+i`: temperature alarm (°C)
//! - Register `240+i`: motor run flag
//! - Registers `6140+10i..`: 10 vibration statistics (÷1000)

pub mod client;
pub mod mock;
pub mod modbus_server;
pub mod register_map;

pub use client::{
    ControllerConnectivityFault, ModbusTcpTransport, ProtocolClient, RegisterTransport,
};
pub use mock::MockRegisterTransport;
pub use modbus_server::{
    sample_register_image, serve, ControllerSimulator, RegisterImage, SharedRegisters,
};
pub use register_map::RegisterBlock;
