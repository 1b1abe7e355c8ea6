// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Holding register map of the condition-monitoring controller
//!
//! Every sensor owns one slice of registers in each of six blocks. The slice
//! for sensor `i` starts at `base + stride * i`.
//!
//! | Block | Base | Stride | Count | Divisor |
//! |-------|------|--------|-------|---------|
//! | Primary | 0 | 5 | 5 | vel/acc ÷1000, temperature ÷100 |
//! | Threshold | 5180 | 12 | 12 | ÷1000 |
//! | Temperature warning | 7680 | 1 | 1 | ÷1 |
//! | Temperature alarm | 7720 | 1 | 1 | ÷1 |
//! | Motor status | 240 | 1 | 1 | ÷1 |
//! | Additional statistics | 6140 | 10 | 10 | ÷1000 |

use std::fmt;

/// Divisor for velocity (mm/s), acceleration (g) and statistics registers
pub const VIBRATION_DIVISOR: f64 = 1000.0;
/// Divisor for the live temperature register (°C × 100)
pub const TEMPERATURE_DIVISOR: f64 = 100.0;
/// Registers already expressed in whole units
pub const UNIT_DIVISOR: f64 = 1.0;

/// The six register blocks read for every sensor, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterBlock {
    Primary,
    Threshold,
    TemperatureWarning,
    TemperatureAlarm,
    MotorStatus,
    AdditionalStats,
}

/// Static description of a block: where it starts, how far apart two sensors
/// are, and how many registers belong to one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub base: u16,
    pub stride: u16,
    pub count: u16,
}

impl RegisterBlock {
    /// All blocks in the order they are read and appended to a record.
    pub const ALL: [RegisterBlock; 6] = [
        RegisterBlock::Primary,
        RegisterBlock::Threshold,
        RegisterBlock::TemperatureWarning,
        RegisterBlock::TemperatureAlarm,
        RegisterBlock::MotorStatus,
        RegisterBlock::AdditionalStats,
    ];

    pub const fn layout(self) -> BlockLayout {
        match self {
            RegisterBlock::Primary => BlockLayout {
                base: 0,
                stride: 5,
                count: 5,
            },
            RegisterBlock::Threshold => BlockLayout {
                base: 5180,
                stride: 12,
                count: 12,
            },
            RegisterBlock::TemperatureWarning => BlockLayout {
                base: 7680,
                stride: 1,
                count: 1,
            },
            RegisterBlock::TemperatureAlarm => BlockLayout {
                base: 7720,
                stride: 1,
                count: 1,
            },
            RegisterBlock::MotorStatus => BlockLayout {
                base: 240,
                stride: 1,
                count: 1,
            },
            RegisterBlock::AdditionalStats => BlockLayout {
                base: 6140,
                stride: 10,
                count: 10,
            },
        }
    }

    /// First register of this block for the given sensor.
    ///
    /// The caller guarantees `sensor` is below the configured sensor count;
    /// configuration validation checks that the last sensor still fits in the
    /// 16-bit address space.
    pub const fn address(self, sensor: u16) -> u16 {
        let layout = self.layout();
        layout.base + layout.stride * sensor
    }

    /// Number of registers read for one sensor.
    pub const fn count(self) -> u16 {
        self.layout().count
    }

    /// Scaling divisor for the register at `offset` within this block.
    pub fn divisor(self, offset: usize) -> f64 {
        match self {
            // z-vel, z-acc, x-vel, x-acc, then temperature
            RegisterBlock::Primary if offset == 4 => TEMPERATURE_DIVISOR,
            RegisterBlock::Primary => VIBRATION_DIVISOR,
            RegisterBlock::Threshold | RegisterBlock::AdditionalStats => VIBRATION_DIVISOR,
            RegisterBlock::TemperatureWarning
            | RegisterBlock::TemperatureAlarm
            | RegisterBlock::MotorStatus => UNIT_DIVISOR,
        }
    }

    /// Convert raw register words into physical units.
    pub fn scale(self, raw: &[u16]) -> Vec<f64> {
        raw.iter()
            .enumerate()
            .map(|(offset, word)| f64::from(*word) / self.divisor(offset))
            .collect()
    }

    /// Highest register (inclusive) touched when reading `sensor_count` sensors,
    /// computed without overflow so configuration checks can reject bad counts.
    pub fn last_register(self, sensor_count: u16) -> u32 {
        let layout = self.layout();
        let last_sensor = u32::from(sensor_count.saturating_sub(1));
        u32::from(layout.base) + u32::from(layout.stride) * last_sensor + u32::from(layout.count)
            - 1
    }
}

impl fmt::Display for RegisterBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterBlock::Primary => "primary",
            RegisterBlock::Threshold => "threshold",
            RegisterBlock::TemperatureWarning => "temperature warning",
            RegisterBlock::TemperatureAlarm => "temperature alarm",
            RegisterBlock::MotorStatus => "motor status",
            RegisterBlock::AdditionalStats => "additional statistics",
        };
        f.write_str(name)
    }
}

/// Position of each channel inside the threshold block as laid out by the
/// controller firmware: x-vel, z-vel, x-acc, z-acc, each as
/// (baseline, warning, alarm).
const THRESHOLD_X_VEL: usize = 0;
const THRESHOLD_Z_VEL: usize = 3;
const THRESHOLD_X_ACC: usize = 6;
const THRESHOLD_Z_ACC: usize = 9;

/// Reorder scaled threshold values from controller layout into record order:
/// baseline, warning and alarm groups, each ordered z-vel, z-acc, x-vel, x-acc.
///
/// Returns the input unchanged when it is not a full block, so a short read
/// stays short.
pub fn threshold_record_order(values: Vec<f64>) -> Vec<f64> {
    if values.len() != RegisterBlock::Threshold.count() as usize {
        return values;
    }
    let mut ordered = Vec::with_capacity(values.len());
    for level in 0..3 {
        for channel in [
            THRESHOLD_Z_VEL,
            THRESHOLD_Z_ACC,
            THRESHOLD_X_VEL,
            THRESHOLD_X_ACC,
        ] {
            ordered.push(values[channel + level]);
        }
    }
    ordered
}
