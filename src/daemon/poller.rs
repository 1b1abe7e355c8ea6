// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Polling cycle
//!
//! One pass walks `Connecting -> Iterating -> Draining`, then the poller
//! sleeps and starts over:
//!
//! ```text
//! Idle -> Connecting -> Iterating -> Draining -> Sleeping -> Connecting ...
//!                                                    \-> Cancelled
//! ```
//!
//! Sensors are visited in ascending index order. Before each sensor the
//! controller link is checked; after its record is assembled the store link
//! is checked. A lost link ends the pass early. Both links are closed exactly
//! once at the end of every pass and reopened by the next one.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time;

use crate::acquisition::assemble_record;
use crate::config::Config;
use crate::modbus::ProtocolClient;
use crate::store::{LoadOutcome, Loader};

/// Phase the poller is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Connecting,
    Iterating,
    Draining,
    Sleeping,
    Cancelled,
}

/// Why a pass stopped before visiting every sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassAbort {
    /// The controller link was not connected when `at_sensor` came up.
    ControllerLost { at_sensor: u16 },
    /// The store link was not connected once `at_sensor` had been read.
    StoreLost { at_sensor: u16 },
    /// Shutdown was requested; `at_sensor` is `None` before iteration began.
    Cancelled { at_sensor: Option<u16> },
}

impl fmt::Display for PassAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassAbort::ControllerLost { at_sensor } => {
                write!(f, "controller link lost before sensor {at_sensor}")
            }
            PassAbort::StoreLost { at_sensor } => {
                write!(f, "store link lost at sensor {at_sensor}")
            }
            PassAbort::Cancelled { at_sensor: Some(sensor) } => {
                write!(f, "cancelled before sensor {sensor}")
            }
            PassAbort::Cancelled { at_sensor: None } => write!(f, "cancelled before connecting"),
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Sensors whose registers were read.
    pub attempted: u16,
    /// Records inserted and committed.
    pub loaded: u16,
    /// Records discarded by validation.
    pub rejected: u16,
    pub abort: Option<PassAbort>,
}

impl PassReport {
    pub fn was_cancelled(&self) -> bool {
        matches!(self.abort, Some(PassAbort::Cancelled { .. }))
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sensors read, {} loaded, {} rejected",
            self.attempted, self.loaded, self.rejected
        )?;
        if let Some(abort) = &self.abort {
            write!(f, " ({abort})")?;
        }
        Ok(())
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolve once the shutdown flag is raised. Never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drives the controller and store clients through repeated passes.
pub struct Poller {
    controller: ProtocolClient,
    loader: Loader,
    sensor_count: u16,
    interval: Duration,
    state: CycleState,
}

impl Poller {
    pub fn new(
        controller: ProtocolClient,
        loader: Loader,
        sensor_count: u16,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            loader,
            sensor_count,
            interval,
            state: CycleState::Idle,
        }
    }

    /// Poller talking Modbus TCP to the configured controller and writing to
    /// the configured SQLite store.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ProtocolClient::from_config(&config.controller),
            Loader::from_config(&config.store, &config.machines),
            config.acquisition.sensor_count,
            config.acquisition.interval(),
        )
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn controller(&self) -> &ProtocolClient {
        &self.controller
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Run one Connecting/Iterating/Draining pass.
    pub async fn run_pass(&mut self, shutdown: &watch::Receiver<bool>) -> PassReport {
        let mut report = PassReport::default();

        if shutdown_requested(shutdown) {
            report.abort = Some(PassAbort::Cancelled { at_sensor: None });
        } else {
            self.state = CycleState::Connecting;
            // Each side is opened on its own; a failure is already logged and
            // surfaces as a connectivity check below.
            let _ = self.controller.connect().await;
            let _ = self.loader.connect();

            self.state = CycleState::Iterating;
            report.abort = self.iterate(shutdown, &mut report).await;
        }

        self.state = CycleState::Draining;
        self.drain().await;

        match &report.abort {
            Some(PassAbort::Cancelled { .. }) | None => info!("Pass finished: {}", report),
            Some(_) => warn!("Pass aborted: {}", report),
        }
        report
    }

    async fn iterate(
        &mut self,
        shutdown: &watch::Receiver<bool>,
        report: &mut PassReport,
    ) -> Option<PassAbort> {
        for sensor in 0..self.sensor_count {
            if shutdown_requested(shutdown) {
                return Some(PassAbort::Cancelled {
                    at_sensor: Some(sensor),
                });
            }
            if !self.controller.is_connected() {
                warn!(
                    "Controller link {} at sensor {}, abandoning pass",
                    self.controller.connectivity(),
                    sensor
                );
                return Some(PassAbort::ControllerLost { at_sensor: sensor });
            }

            let record = assemble_record(&mut self.controller, sensor).await;
            report.attempted += 1;

            if !self.loader.is_connected() {
                warn!(
                    "Store link {} at sensor {}, abandoning pass",
                    self.loader.connectivity(),
                    sensor
                );
                return Some(PassAbort::StoreLost { at_sensor: sensor });
            }

            match self.loader.load(&record) {
                LoadOutcome::Inserted { .. } => report.loaded += 1,
                LoadOutcome::Rejected(_) => report.rejected += 1,
                // connectivity is now Faulted; picked up at the next sensor
                LoadOutcome::Failed(_) => {}
            }
        }
        None
    }

    async fn drain(&mut self) {
        let controller = self.controller.close().await;
        let store = self.loader.close();
        debug!("Closed controller ({:?}) and store ({:?})", controller, store);
    }

    /// Poll until shutdown is requested.
    ///
    /// Cancellation is honoured before each phase, before each sensor and
    /// during the sleep. Connectivity faults never end the loop.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Polling {} sensors every {}s",
            self.sensor_count,
            self.interval.as_secs()
        );
        loop {
            let report = self.run_pass(&shutdown).await;
            if report.was_cancelled() || shutdown_requested(&shutdown) {
                break;
            }

            self.state = CycleState::Sleeping;
            debug!("Sleeping {}s until next pass", self.interval.as_secs());
            tokio::select! {
                _ = time::sleep(self.interval) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
        self.state = CycleState::Cancelled;
        info!("Poller stopped");
        Ok(())
    }
}
