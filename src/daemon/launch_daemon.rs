// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use log::{error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::poller::Poller;
use crate::config::Config;

/// Represents the background polling task and its shutdown switch
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Daemon {
            tasks: Vec::new(),
            shutdown,
        }
    }

    /// Launch the polling task based on configuration
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        self.start_poller(Poller::from_config(config));
        Ok(())
    }

    /// Spawn `poller` on the runtime, wired to this daemon's shutdown switch
    pub fn start_poller(&mut self, mut poller: Poller) {
        info!("Starting acquisition poller");
        let shutdown = self.shutdown.subscribe();
        let task = tokio::spawn(async move { poller.run(shutdown).await });
        self.tasks.push(task);
    }

    /// Ask every task to stop at its next phase boundary
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.shutdown.send_replace(true);
    }

    /// Wait for all tasks to complete
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Task failed: {}", e),
                Err(e) => error!("Task panicked: {}", e),
            }
        }
        Ok(())
    }
}
