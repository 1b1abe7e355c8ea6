// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Controller link configuration
//!
//! This module defines where the poller finds the Modbus TCP controller
//! that exposes the sensor registers.

use serde::{Deserialize, Serialize};

/// Connection settings for the Modbus TCP controller.
///
/// # Fields
///
/// * `address` - Host name or IP address of the controller
/// * `port` - TCP port (default: 502)
/// * `unit_id` - Modbus unit identifier addressed by every request (default: 1)
/// * `timeout_ms` - Optional bound on connect and read calls, in milliseconds
///
/// # Example
///
/// ```
/// use cbm_poller::config::ControllerConfig;
///
/// let controller = ControllerConfig {
///     address: "192.168.10.20".to_string(),
///     port: 502,
///     unit_id: 1,
///     timeout_ms: Some(2000),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    /// Host name or IP address of the controller.
    pub address: String,

    /// The TCP port the controller listens on.
    ///
    /// Default value is 502, the standard Modbus TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit identifier.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Upper bound for connect and read calls. No bound when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: default_port(),
            unit_id: default_unit_id(),
            timeout_ms: None,
        }
    }
}
