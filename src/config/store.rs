// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Measurement store configuration

use serde::{Deserialize, Serialize};

/// Location of the SQLite measurement database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path of the database file, created on first connect.
    pub path: String,

    /// Create the `machines`, `sensors` and `machine_data` tables when missing.
    #[serde(default = "default_create_schema")]
    pub create_schema: bool,
}

fn default_create_schema() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "cbm.sqlite3".to_string(),
            create_schema: default_create_schema(),
        }
    }
}
