// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Telemetry acquisition module
//!
//! This module turns controller registers into sensor records: the
//! [`Extractor`] reads and scales each register block, and
//! [`assemble_record`] concatenates the blocks of one sensor into a
//! [`RecordBuilder`].

pub mod extractor;
pub mod record;

pub use extractor::{assemble_record, Extractor};
pub use record::{
    FieldValue, RecordBuilder, SensorRecord, ValidationFault, RECORD_FIELD_COUNT,
    RECORD_VALUE_COUNT,
};
