// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Utility module
//!
//! Small types shared by the controller and store sides of the pipeline.

pub mod connectivity;

pub use connectivity::{CloseOutcome, Connectivity};
