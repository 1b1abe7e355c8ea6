// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition configuration
//!
//! This module defines how many sensors are polled and how long the poller
//! rests between passes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling cadence and sensor population.
///
/// # Example
///
/// ```
/// use cbm_poller::config::AcquisitionConfig;
///
/// let acquisition = AcquisitionConfig {
///     sensor_count: 4,
///     interval_secs: 60,
/// };
/// assert_eq!(acquisition.interval().as_secs(), 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcquisitionConfig {
    /// Number of sensors, polled as indices `0..sensor_count`.
    pub sensor_count: u16,

    /// Pause between the end of one pass and the start of the next, in seconds.
    pub interval_secs: u64,
}

impl AcquisitionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sensor_count: 16,
            interval_secs: 300,
        }
    }
}
