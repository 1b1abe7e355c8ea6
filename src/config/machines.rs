// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Machine inventory configuration
//!
//! The inventory names the monitored machines and attaches sensor indices to
//! them. It is written to the `machines` and `sensors` tables each time the
//! store is opened, so readings can be grouped and filtered by machine.
//!
//! ```yaml
//! machines:
//!   - id: 7
//!     name: Compressor A
//!     location: Hall 2
//!     sensors:
//!       - id: 0
//!         name: Motor DE
//!         type: vibration
//! ```

use serde::{Deserialize, Serialize};

/// One monitored machine and the sensors mounted on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineConfig {
    pub id: i64,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

/// A sensor index on the controller and the name it is reported under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorConfig {
    /// Sensor index as polled from the controller.
    pub id: u16,

    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
}
