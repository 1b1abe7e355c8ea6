// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-process register transport for tests and dry runs
//!
//! Clones share one state, so a test can keep a handle to inject faults and
//! inspect call counts after the transport has been boxed into a
//! [`ProtocolClient`](super::ProtocolClient).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::client::{ControllerConnectivityFault, RegisterTransport};
use super::modbus_server::{register_read, sample_register_image, write_block, RegisterImage};
use super::register_map::RegisterBlock;

#[derive(Debug, Default)]
struct MockState {
    registers: RegisterImage,
    refuse_connect: bool,
    failing_addresses: HashSet<u16>,
    truncate: bool,
    open: bool,
    connects: usize,
    disconnects: usize,
    reads: Vec<(u16, u16)>,
}

/// Register transport backed by an in-memory image.
#[derive(Debug, Clone, Default)]
pub struct MockRegisterTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockRegisterTransport {
    pub fn new(registers: RegisterImage) -> Self {
        let state = MockState {
            registers,
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Transport whose image holds the sample reading for `sensor_count` sensors.
    pub fn with_sensors(sensor_count: u16) -> Self {
        Self::new(sample_register_image(sensor_count))
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write_block(&self, block: RegisterBlock, sensor: u16, raw: &[u16]) {
        write_block(&mut self.state().registers, block, sensor, raw);
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state().refuse_connect = refuse;
    }

    /// Every read starting at `address` fails with a transport error.
    pub fn fail_reads_at(&self, address: u16) {
        self.state().failing_addresses.insert(address);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_addresses.clear();
        state.refuse_connect = false;
        state.truncate = false;
    }

    /// Answer every read with one register less than requested.
    pub fn truncate_responses(&self, truncate: bool) {
        self.state().truncate = truncate;
    }

    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    pub fn disconnect_count(&self) -> usize {
        self.state().disconnects
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    /// Every `(address, count)` read attempted on an open session, in order.
    pub fn read_log(&self) -> Vec<(u16, u16)> {
        self.state().reads.clone()
    }
}

#[async_trait]
impl RegisterTransport for MockRegisterTransport {
    async fn connect(&mut self) -> Result<(), ControllerConnectivityFault> {
        let mut state = self.state();
        state.connects += 1;
        if state.refuse_connect {
            return Err(ControllerConnectivityFault::Connect {
                endpoint: "mock".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        state.open = true;
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ControllerConnectivityFault> {
        let mut state = self.state();
        if !state.open {
            return Err(ControllerConnectivityFault::NotConnected);
        }
        state.reads.push((address, count));

        if state.failing_addresses.contains(&address) {
            return Err(ControllerConnectivityFault::Transport {
                address,
                count,
                reason: "connection reset by peer".to_string(),
            });
        }

        let mut words = register_read(&state.registers, address, count).map_err(|code| {
            ControllerConnectivityFault::Exception {
                address,
                count,
                code: format!("{code:?}"),
            }
        })?;
        if state.truncate {
            words.pop();
        }
        Ok(words)
    }

    async fn disconnect(&mut self) -> Result<(), ControllerConnectivityFault> {
        let mut state = self.state();
        if state.open {
            state.open = false;
            state.disconnects += 1;
        }
        Ok(())
    }
}
