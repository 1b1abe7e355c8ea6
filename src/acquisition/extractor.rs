// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-sensor block extraction
//!
//! Each block is read once, if and only if the controller link is connected
//! at call time. A fault on one block marks the link faulted, so every later
//! block of the same sensor comes back empty. The poller only notices at the
//! next sensor.

use chrono::Local;
use log::debug;

use super::record::{FieldValue, RecordBuilder};
use crate::modbus::register_map::threshold_record_order;
use crate::modbus::{ProtocolClient, RegisterBlock};

/// Reads and scales the register blocks of one sensor.
pub struct Extractor<'a> {
    client: &'a mut ProtocolClient,
}

impl<'a> Extractor<'a> {
    pub fn new(client: &'a mut ProtocolClient) -> Self {
        Self { client }
    }

    /// One read of `block` for `sensor`, scaled. `None` when the link is not
    /// connected or the read faulted.
    async fn read_scaled(&mut self, block: RegisterBlock, sensor: u16) -> Option<Vec<f64>> {
        if !self.client.is_connected() {
            debug!(
                "Skipping {} block of sensor {}: controller link {}",
                block,
                sensor,
                self.client.connectivity()
            );
            return None;
        }
        self.client
            .read_registers(block.address(sensor), block.count())
            .await
            .ok()
            .map(|raw| block.scale(&raw))
    }

    /// Sensor index, capture time, z-vel, z-acc, x-vel, x-acc and temperature.
    pub async fn primary(&mut self, sensor: u16) -> Vec<FieldValue> {
        match self.read_scaled(RegisterBlock::Primary, sensor).await {
            Some(values) => {
                let mut fields = Vec::with_capacity(values.len() + 2);
                fields.push(FieldValue::SensorIndex(sensor));
                fields.push(FieldValue::Timestamp(Local::now().naive_local()));
                fields.extend(values.into_iter().map(FieldValue::Value));
                fields
            }
            None => Vec::new(),
        }
    }

    /// Baseline, warning and alarm thresholds, each as z-vel, z-acc, x-vel, x-acc.
    pub async fn thresholds(&mut self, sensor: u16) -> Vec<f64> {
        self.read_scaled(RegisterBlock::Threshold, sensor)
            .await
            .map(threshold_record_order)
            .unwrap_or_default()
    }

    /// Temperature warning level in °C.
    pub async fn temperature_warning(&mut self, sensor: u16) -> Option<f64> {
        self.single(RegisterBlock::TemperatureWarning, sensor).await
    }

    /// Temperature alarm level in °C.
    pub async fn temperature_alarm(&mut self, sensor: u16) -> Option<f64> {
        self.single(RegisterBlock::TemperatureAlarm, sensor).await
    }

    /// Motor run flag (1 running, 0 stopped).
    pub async fn motor_status(&mut self, sensor: u16) -> Option<f64> {
        self.single(RegisterBlock::MotorStatus, sensor).await
    }

    /// z/x peak acceleration, z/x peak velocity, z/x RMS low acceleration,
    /// z/x kurtosis and z/x crest factor.
    pub async fn additional_stats(&mut self, sensor: u16) -> Vec<f64> {
        self.read_scaled(RegisterBlock::AdditionalStats, sensor)
            .await
            .unwrap_or_default()
    }

    async fn single(&mut self, block: RegisterBlock, sensor: u16) -> Option<f64> {
        self.read_scaled(block, sensor)
            .await
            .and_then(|values| values.first().copied())
    }

    /// Fields contributed by `block`, in record order.
    pub async fn extract(&mut self, block: RegisterBlock, sensor: u16) -> Vec<FieldValue> {
        let values = match block {
            RegisterBlock::Primary => return self.primary(sensor).await,
            RegisterBlock::Threshold => self.thresholds(sensor).await,
            RegisterBlock::TemperatureWarning => {
                self.temperature_warning(sensor).await.into_iter().collect()
            }
            RegisterBlock::TemperatureAlarm => {
                self.temperature_alarm(sensor).await.into_iter().collect()
            }
            RegisterBlock::MotorStatus => self.motor_status(sensor).await.into_iter().collect(),
            RegisterBlock::AdditionalStats => self.additional_stats(sensor).await,
        };
        values.into_iter().map(FieldValue::Value).collect()
    }
}

/// Read all six blocks of `sensor` and concatenate them in record order.
///
/// No validation happens here; a faulted sensor yields a short builder.
pub async fn assemble_record(client: &mut ProtocolClient, sensor: u16) -> RecordBuilder {
    let mut extractor = Extractor::new(client);
    let mut builder = RecordBuilder::new();
    for block in RegisterBlock::ALL {
        let fields = extractor.extract(block, sensor).await;
        builder.append(block, fields);
    }
    builder
}
