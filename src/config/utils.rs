// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::{debug, warn};

use super::Config;
use crate::modbus::RegisterBlock;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./cbm_poller --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Check if a string looks like a DNS host name (RFC 1123 labels).
fn is_plausible_host_name(addr: &str) -> bool {
    !addr.is_empty()
        && addr.len() <= 253
        && addr.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Sensor count**: at least one sensor
/// - **Interval**: at least one second between passes
/// - **Port Range**: the controller port is within 1-65535
/// - **Register space**: every block of the last sensor lies within the 16-bit
///   register address space
/// - **Machine inventory**: machine ids and sensor ids are unique; a sensor
///   outside the polled range only warns
/// - **Controller address**: an IP address or plausible host name (warning only)
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let sensor_count = config.acquisition.sensor_count;
    if sensor_count < 1 {
        anyhow::bail!("At least one sensor must be polled");
    }

    if config.acquisition.interval_secs < 1 {
        anyhow::bail!(
            "Invalid polling interval: {}s",
            config.acquisition.interval_secs
        );
    }

    if config.controller.port < 1 {
        anyhow::bail!("Invalid port number: {}", config.controller.port);
    }

    for block in RegisterBlock::ALL {
        let last = block.last_register(sensor_count);
        if last > u32::from(u16::MAX) {
            anyhow::bail!(
                "{} block of sensor {} ends at register {}, beyond the 16-bit address space",
                block,
                sensor_count - 1,
                last
            );
        }
    }

    let mut machine_ids = HashSet::new();
    let mut sensor_ids = HashSet::new();
    for machine in &config.machines {
        if !machine_ids.insert(machine.id) {
            anyhow::bail!("Machine id {} is listed more than once", machine.id);
        }
        for sensor in &machine.sensors {
            if !sensor_ids.insert(sensor.id) {
                anyhow::bail!(
                    "Sensor {} is attached to more than one machine entry",
                    sensor.id
                );
            }
            if sensor.id >= sensor_count {
                warn!(
                    "Sensor {} of machine {} is not polled (sensor_count is {})",
                    sensor.id, machine.id, sensor_count
                );
            }
        }
    }

    let address = &config.controller.address;
    if !is_valid_ip_address(address) && !is_plausible_host_name(address) {
        // Just issue a warning but don't block
        warn!("Potentially invalid controller address: {}", address);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MachineConfig, SensorConfig};

    fn machine(id: i64, sensors: &[u16]) -> MachineConfig {
        MachineConfig {
            id,
            name: format!("Machine {id}"),
            location: None,
            sensors: sensors
                .iter()
                .map(|&sensor| SensorConfig {
                    id: sensor,
                    name: format!("Sensor {sensor}"),
                    sensor_type: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_machine_inventory_rules() {
        let mut config = Config::default();
        config.machines = vec![machine(1, &[0, 1]), machine(2, &[2])];
        assert!(validate_specific_rules(&config).is_ok());

        // unpolled sensor only warns
        config.machines[1].sensors[0].id = 40;
        assert!(validate_specific_rules(&config).is_ok());

        config.machines = vec![machine(1, &[0]), machine(1, &[1])];
        let err = validate_specific_rules(&config).unwrap_err();
        assert!(err.to_string().contains("Machine id 1"));

        config.machines = vec![machine(1, &[0]), machine(2, &[0])];
        let err = validate_specific_rules(&config).unwrap_err();
        assert!(err.to_string().contains("Sensor 0"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_sensors_rejected() {
        let mut config = Config::default();
        config.acquisition.sensor_count = 0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.acquisition.interval_secs = 0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_register_space_overflow_rejected() {
        let mut config = Config::default();
        // additional stats stride puts sensor 10000 well past 65535
        config.acquisition.sensor_count = 10_000;
        let err = validate_specific_rules(&config).unwrap_err();
        assert!(err.to_string().contains("16-bit"));
    }

    #[test]
    fn test_host_names() {
        assert!(is_plausible_host_name("plc-01.plant.local"));
        assert!(!is_plausible_host_name("bad host"));
        assert!(!is_plausible_host_name("-leading.example"));
        // an odd address only warns
        let mut config = Config::default();
        config.controller.address = "bad host".to_string();
        assert!(validate_specific_rules(&config).is_ok());
    }
}
