// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Condition-monitoring poller library
//!
//! This library reads vibration and temperature telemetry for a fixed set of
//! sensors from a Modbus TCP controller and stores one row per sensor per
//! pass in a SQLite database.
//!
//! - [`modbus`]: register map, controller client and simulator
//! - [`acquisition`]: block extraction and record assembly
//! - [`store`]: validation, persistence and read-side queries
//! - [`daemon`]: the polling cycle
//! - [`config`]: YAML configuration

pub mod acquisition;
pub mod config;
pub mod daemon;
pub mod modbus;
pub mod store;
pub mod utility;
