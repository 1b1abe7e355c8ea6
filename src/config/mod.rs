// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the condition-monitoring poller
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! - `controller`: where the Modbus TCP controller is reached
//! - `store`: where measurements are persisted
//! - `acquisition`: how many sensors are polled, and how often
//! - `machines`: which machine each sensor is mounted on (optional)
//!
//! ## Usage
//!
//! ```no_run
//! use cbm_poller::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("192.168.10.20".to_string()), // Controller address
//!     Some(502),                         // Controller port
//!     Some(8),                           // Sensor count
//!     Some(60),                          // Interval in seconds
//!     None,                              // Store path
//! );
//!
//! println!("Polling {} sensors", config.acquisition.sensor_count);
//! ```

pub mod acquisition;
pub mod controller;
pub mod machines;
pub mod store;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use acquisition::AcquisitionConfig;
pub use controller::ControllerConfig;
pub use machines::{MachineConfig, SensorConfig};
pub use store::StoreConfig;
pub use utils::{is_valid_ip_address, output_config_schema};

/// Root configuration structure of the poller.
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, allowing for minimal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Modbus TCP controller exposing the sensor registers.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// SQLite measurement store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Sensor population and polling interval.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Machine inventory written to the store on connect.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub machines: Vec<MachineConfig>,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file that fails
    /// schema validation, deserialization or the additional rules leaves a
    /// `<name>.sample.yaml` next to it and returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)
            .context("Failed to build JSON schema validator")?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the loaded
    /// configuration.
    ///
    /// # Parameters
    ///
    /// * `controller_address` - Host or IP of the Modbus controller
    /// * `controller_port` - TCP port of the Modbus controller
    /// * `sensor_count` - Number of sensors to poll
    /// * `interval_secs` - Pause between passes, in seconds
    /// * `store_path` - Path of the SQLite database
    pub fn apply_args(
        &mut self,
        controller_address: Option<String>,
        controller_port: Option<u16>,
        sensor_count: Option<u16>,
        interval_secs: Option<u64>,
        store_path: Option<String>,
    ) {
        if let Some(address) = controller_address {
            debug!("Overriding controller address from command line: {}", address);
            self.controller.address = address;
        }
        if let Some(port) = controller_port {
            debug!("Overriding controller port from command line: {}", port);
            self.controller.port = port;
        }
        if let Some(count) = sensor_count {
            debug!("Overriding sensor count from command line: {}", count);
            self.acquisition.sensor_count = count;
        }
        if let Some(interval) = interval_secs {
            debug!("Overriding polling interval from command line: {}s", interval);
            self.acquisition.interval_secs = interval;
        }
        if let Some(path) = store_path {
            debug!("Overriding store path from command line: {}", path);
            self.store.path = path;
        }
    }
}
