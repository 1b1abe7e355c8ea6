// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor records and the builder that assembles them
//!
//! A record is 32 fields: sensor index, capture timestamp, then 30 scaled
//! values (7 + 12 + 3 + 10 in block order). [`RecordBuilder`] accepts whatever
//! the extractor produced, including nothing at all for a faulted block, and
//! only [`RecordBuilder::build`] decides whether the result is a valid
//! [`SensorRecord`].

use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::modbus::RegisterBlock;

/// Number of fields in a complete record.
pub const RECORD_FIELD_COUNT: usize = 32;

/// Number of scaled values following the sensor index and timestamp.
pub const RECORD_VALUE_COUNT: usize = RECORD_FIELD_COUNT - 2;

/// One scalar of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    SensorIndex(u16),
    Timestamp(NaiveDateTime),
    Value(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::SensorIndex(index) => write!(f, "{index}"),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            FieldValue::Value(value) => write!(f, "{value}"),
        }
    }
}

/// Record shape mismatch. The record is discarded whole.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationFault {
    #[error("Record has {found} fields, expected 32")]
    Length { found: usize },

    #[error("Record field {position} should be {expected}, found {found}")]
    Shape {
        position: usize,
        expected: &'static str,
        found: String,
    },
}

/// A complete, validated reading for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub sensor_index: u16,
    pub captured_at: NaiveDateTime,
    /// Scaled values in column order, starting with z-velocity.
    pub values: [f64; RECORD_VALUE_COUNT],
}

impl SensorRecord {
    /// The record as its 32 fields, in column order.
    pub fn fields(&self) -> Vec<FieldValue> {
        let mut fields = Vec::with_capacity(RECORD_FIELD_COUNT);
        fields.push(FieldValue::SensorIndex(self.sensor_index));
        fields.push(FieldValue::Timestamp(self.captured_at));
        fields.extend(self.values.iter().copied().map(FieldValue::Value));
        fields
    }
}

/// Appends block outputs in the fixed record order.
///
/// Holds partial records too, so a faulted pass can be inspected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBuilder {
    fields: Vec<FieldValue>,
    blocks: Vec<(RegisterBlock, usize)>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the fields extracted for `block`. An empty `fields` is recorded
    /// as a block that contributed nothing.
    pub fn append(&mut self, block: RegisterBlock, fields: Vec<FieldValue>) -> &mut Self {
        self.blocks.push((block, fields.len()));
        self.fields.extend(fields);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// Blocks appended so far with the number of fields each contributed.
    pub fn appended_blocks(&self) -> &[(RegisterBlock, usize)] {
        &self.blocks
    }

    /// Sensor index carried by the record, if the primary block made it in.
    pub fn sensor_index(&self) -> Option<u16> {
        match self.fields.first() {
            Some(FieldValue::SensorIndex(index)) => Some(*index),
            _ => None,
        }
    }

    /// Produce the typed record, or the reason it cannot be persisted.
    pub fn build(&self) -> Result<SensorRecord, ValidationFault> {
        if self.fields.len() != RECORD_FIELD_COUNT {
            return Err(ValidationFault::Length {
                found: self.fields.len(),
            });
        }

        let sensor_index = match self.fields[0] {
            FieldValue::SensorIndex(index) => index,
            other => return Err(shape_fault(0, "the sensor index", other)),
        };
        let captured_at = match self.fields[1] {
            FieldValue::Timestamp(ts) => ts,
            other => return Err(shape_fault(1, "the capture timestamp", other)),
        };

        let mut values = [0.0; RECORD_VALUE_COUNT];
        for (slot, (position, field)) in values
            .iter_mut()
            .zip(self.fields.iter().enumerate().skip(2))
        {
            match field {
                FieldValue::Value(value) => *slot = *value,
                other => return Err(shape_fault(position, "a measured value", *other)),
            }
        }

        Ok(SensorRecord {
            sensor_index,
            captured_at,
            values,
        })
    }
}

fn shape_fault(position: usize, expected: &'static str, found: FieldValue) -> ValidationFault {
    ValidationFault::Shape {
        position,
        expected,
        found: format!("{found:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn values(n: usize, value: f64) -> Vec<FieldValue> {
        vec![FieldValue::Value(value); n]
    }

    fn full_builder() -> RecordBuilder {
        let mut primary = vec![FieldValue::SensorIndex(4), FieldValue::Timestamp(timestamp())];
        primary.extend(values(5, 1.0));
        let mut builder = RecordBuilder::new();
        builder
            .append(RegisterBlock::Primary, primary)
            .append(RegisterBlock::Threshold, values(12, 0.1))
            .append(RegisterBlock::TemperatureWarning, values(1, 60.0))
            .append(RegisterBlock::TemperatureAlarm, values(1, 80.0))
            .append(RegisterBlock::MotorStatus, values(1, 1.0))
            .append(RegisterBlock::AdditionalStats, values(10, 1.0));
        builder
    }

    #[test]
    fn test_full_builder_produces_record() {
        let builder = full_builder();
        assert_eq!(builder.len(), RECORD_FIELD_COUNT);
        assert_eq!(builder.sensor_index(), Some(4));

        let record = builder.build().unwrap();
        assert_eq!(record.sensor_index, 4);
        assert_eq!(record.captured_at, timestamp());
        assert_eq!(record.values[19], 1.0);
        assert_eq!(record.fields().len(), RECORD_FIELD_COUNT);
        assert_eq!(record.fields(), builder.fields());
    }

    #[test]
    fn test_short_builder_is_rejected() {
        let mut builder = RecordBuilder::new();
        builder
            .append(RegisterBlock::Primary, Vec::new())
            .append(RegisterBlock::Threshold, Vec::new());
        assert!(builder.is_empty());
        assert_eq!(builder.appended_blocks().len(), 2);
        assert_eq!(builder.build(), Err(ValidationFault::Length { found: 0 }));
    }

    #[test]
    fn test_long_builder_is_rejected() {
        let mut builder = full_builder();
        builder.append(RegisterBlock::MotorStatus, values(1, 1.0));
        assert_eq!(builder.build(), Err(ValidationFault::Length { found: 33 }));
    }

    #[test]
    fn test_misordered_fields_are_rejected() {
        let mut builder = RecordBuilder::new();
        builder.append(RegisterBlock::Primary, values(RECORD_FIELD_COUNT, 1.0));
        assert!(matches!(
            builder.build(),
            Err(ValidationFault::Shape { position: 0, .. })
        ));
    }
}
