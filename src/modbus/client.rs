// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus client side of the poller
//!
//! As in the server module, "client" is the Modbus master (this program) and
//! "server" is the controller that exposes the holding registers.
//!
//! [`ProtocolClient`] owns one session and its [`Connectivity`]. The actual
//! I/O goes through a [`RegisterTransport`] so the TCP transport can be swapped
//! for [`MockRegisterTransport`](super::mock::MockRegisterTransport) in tests.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use thiserror::Error;
use tokio::time;
use tokio_modbus::client::{tcp, Client, Context, Reader};
use tokio_modbus::Slave;

use crate::config::ControllerConfig;
use crate::utility::{CloseOutcome, Connectivity};

/// Open or read failure on the controller link.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerConnectivityFault {
    #[error("Failed to resolve controller address {endpoint}: {reason}")]
    Resolve { endpoint: String, reason: String },

    #[error("Failed to connect to controller at {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Transport error reading {count} registers at {address}: {reason}")]
    Transport {
        address: u16,
        count: u16,
        reason: String,
    },

    #[error("Controller answered exception {code} for {count} registers at {address}")]
    Exception {
        address: u16,
        count: u16,
        code: String,
    },

    #[error("Short response at {address}: expected {expected} registers, received {received}")]
    ShortResponse {
        address: u16,
        expected: u16,
        received: usize,
    },

    #[error("Controller did not answer within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Failed to release controller session: {reason}")]
    Disconnect { reason: String },

    #[error("Controller is not connected")]
    NotConnected,
}

/// Raw access to the controller's holding registers.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Open a session.
    async fn connect(&mut self) -> Result<(), ControllerConnectivityFault>;

    /// Read `count` holding registers starting at `address`.
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ControllerConnectivityFault>;

    /// Release the session. Must be safe to call when nothing is open.
    async fn disconnect(&mut self) -> Result<(), ControllerConnectivityFault>;
}

/// Modbus TCP transport built on `tokio-modbus`.
pub struct ModbusTcpTransport {
    address: String,
    port: u16,
    unit_id: u8,
    timeout: Option<Duration>,
    context: Option<Context>,
}

impl ModbusTcpTransport {
    pub fn new(address: impl Into<String>, port: u16, unit_id: u8) -> Self {
        Self {
            address: address.into(),
            port,
            unit_id,
            timeout: None,
            context: None,
        }
    }

    /// Bound every connect and read by `timeout`. Without it the transport
    /// default applies and a hung controller blocks the pass.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout
            .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn connect(&mut self) -> Result<(), ControllerConnectivityFault> {
        let endpoint = self.endpoint();
        let socket_addr = tokio::net::lookup_host((self.address.as_str(), self.port))
            .await
            .map_err(|e| ControllerConnectivityFault::Resolve {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| ControllerConnectivityFault::Resolve {
                endpoint: endpoint.clone(),
                reason: "no address found".to_string(),
            })?;

        debug!("Opening Modbus TCP session to {}", socket_addr);
        let connecting = tcp::connect_slave(socket_addr, Slave(self.unit_id));
        let result = match self.timeout {
            Some(timeout) => time::timeout(timeout, connecting).await.map_err(|_| {
                ControllerConnectivityFault::Timeout {
                    timeout_ms: self.timeout_ms(),
                }
            })?,
            None => connecting.await,
        };

        let context = result.map_err(|e| ControllerConnectivityFault::Connect {
            endpoint,
            reason: e.to_string(),
        })?;
        self.context = Some(context);
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ControllerConnectivityFault> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let context = self
            .context
            .as_mut()
            .ok_or(ControllerConnectivityFault::NotConnected)?;

        let request = context.read_holding_registers(address, count);
        let response = match timeout {
            Some(timeout) => time::timeout(timeout, request)
                .await
                .map_err(|_| ControllerConnectivityFault::Timeout { timeout_ms })?,
            None => request.await,
        };

        match response {
            Ok(Ok(words)) => Ok(words),
            Ok(Err(code)) => Err(ControllerConnectivityFault::Exception {
                address,
                count,
                code: format!("{code:?}"),
            }),
            Err(e) => Err(ControllerConnectivityFault::Transport {
                address,
                count,
                reason: e.to_string(),
            }),
        }
    }

    async fn disconnect(&mut self) -> Result<(), ControllerConnectivityFault> {
        match self.context.take() {
            Some(mut context) => {
                context
                    .disconnect()
                    .await
                    .map_err(|e| ControllerConnectivityFault::Disconnect {
                        reason: e.to_string(),
                    })
            }
            None => Ok(()),
        }
    }
}

/// One controller session plus its connectivity state.
///
/// None of the operations panic or propagate a fault as a hard failure:
/// every fault is returned as a value and reflected in [`Connectivity`].
pub struct ProtocolClient {
    transport: Box<dyn RegisterTransport>,
    connectivity: Connectivity,
    session_open: bool,
}

impl ProtocolClient {
    pub fn new(transport: Box<dyn RegisterTransport>) -> Self {
        Self {
            transport,
            connectivity: Connectivity::Disconnected,
            session_open: false,
        }
    }

    /// Build a client talking Modbus TCP to the configured controller.
    pub fn from_config(config: &ControllerConfig) -> Self {
        let transport = ModbusTcpTransport::new(config.address.clone(), config.port, config.unit_id)
            .with_timeout(config.timeout_ms.map(Duration::from_millis));
        Self::new(Box::new(transport))
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.is_connected()
    }

    /// Open a fresh session. A session still held from before is released first.
    pub async fn connect(&mut self) -> Result<(), ControllerConnectivityFault> {
        if self.session_open {
            self.close().await;
        }
        match self.transport.connect().await {
            Ok(()) => {
                info!("Connected to controller");
                self.session_open = true;
                self.connectivity = Connectivity::Connected;
                Ok(())
            }
            Err(fault) => {
                error!("{}", fault);
                self.connectivity = Connectivity::Faulted;
                Err(fault)
            }
        }
    }

    /// Read `count` holding registers at `address`.
    ///
    /// Any fault marks the client [`Connectivity::Faulted`]. When the client is
    /// not connected the transport is not touched.
    pub async fn read_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ControllerConnectivityFault> {
        if !self.is_connected() {
            return Err(ControllerConnectivityFault::NotConnected);
        }

        debug!("Reading {} holding registers at {}", count, address);
        let result = match self.transport.read_holding_registers(address, count).await {
            Ok(words) if words.len() == count as usize => Ok(words),
            Ok(words) => Err(ControllerConnectivityFault::ShortResponse {
                address,
                expected: count,
                received: words.len(),
            }),
            Err(fault) => Err(fault),
        };

        if let Err(fault) = &result {
            error!("{}", fault);
            self.connectivity = Connectivity::Faulted;
        }
        result
    }

    /// Release the session if one is held. Idempotent, never fails.
    pub async fn close(&mut self) -> CloseOutcome {
        let outcome = if self.session_open {
            self.session_open = false;
            match self.transport.disconnect().await {
                Ok(()) => CloseOutcome::Released,
                Err(fault) => {
                    debug!("Ignoring error while closing controller session: {}", fault);
                    CloseOutcome::ReleasedWithError(fault.to_string())
                }
            }
        } else {
            CloseOutcome::AlreadyClosed
        };
        self.connectivity = Connectivity::Disconnected;
        outcome
    }
}
