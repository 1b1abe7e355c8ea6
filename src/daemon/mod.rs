// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! The daemon module runs the acquisition poller in the background and stops
//! it cleanly on request.
//!
//! ## Components
//!
//! * **Poller**: the connect, iterate, drain and sleep cycle over all sensors
//! * **Launch Daemon**: spawns the poller and owns its shutdown switch
//!
//! ## Usage
//!
//! ```no_run
//! use cbm_poller::{config::Config, daemon::Daemon};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Wait for shutdown signal (e.g., Ctrl+C)
//!     tokio::signal::ctrl_c().await?;
//!
//!     // Clean shutdown
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod launch_daemon;
pub mod poller;

pub use launch_daemon::Daemon;
pub use poller::{CycleState, PassAbort, PassReport, Poller};
