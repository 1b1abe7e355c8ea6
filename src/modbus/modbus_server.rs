// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated condition-monitoring controller
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! The simulator exposes the same holding register map as the real controller
//! (see [`register_map`](super::register_map)) so the poller can be exercised
//! end to end without plant hardware. It is used by the `plc_simulator` binary
//! and by the integration tests.

use std::{
    collections::HashMap,
    future,
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, error, info};
use tokio::net::{TcpListener, TcpStream};
use tokio_modbus::prelude::{ExceptionCode, Request, Response};
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use super::register_map::RegisterBlock;

/// Sparse holding register image: address → raw word.
pub type RegisterImage = HashMap<u16, u16>;

/// Register image shared between the simulator and whoever drives it.
pub type SharedRegisters = Arc<Mutex<RegisterImage>>;

/// Raw words written for every sensor by [`sample_register_image`].
pub const SAMPLE_PRIMARY: [u16; 5] = [1000, 100, 500, 50, 2500];
pub const SAMPLE_THRESHOLD: [u16; 12] = [100; 12];
pub const SAMPLE_TEMPERATURE_WARNING: u16 = 60;
pub const SAMPLE_TEMPERATURE_ALARM: u16 = 80;
pub const SAMPLE_MOTOR_RUNNING: u16 = 1;
pub const SAMPLE_ADDITIONAL: [u16; 10] = [1000; 10];

/// Modbus service answering holding register requests from a shared image.
pub struct ControllerSimulator {
    holding_registers: SharedRegisters,
}

impl tokio_modbus::server::Service for ControllerSimulator {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Only 0x03 (read), 0x06 and 0x10 (write) are served; the real
    /// controller exposes nothing else to the poller.
    fn call(&self, req: Self::Request) -> Self::Future {
        let mut registers = self
            .holding_registers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let res = match req {
            Request::ReadHoldingRegisters(addr, cnt) => {
                debug!(
                    "Reading {} holding registers starting from address {}",
                    cnt, addr
                );
                register_read(&registers, addr, cnt).map(Response::ReadHoldingRegisters)
            }
            Request::WriteMultipleRegisters(addr, values) => {
                register_write(&mut registers, addr, &values)
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            Request::WriteSingleRegister(addr, value) => {
                register_write(&mut registers, addr, std::slice::from_ref(&value))
                    .map(|_| Response::WriteSingleRegister(addr, value))
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

impl ControllerSimulator {
    pub fn new(holding_registers: SharedRegisters) -> Self {
        Self { holding_registers }
    }
}

/// Register image where every sensor reports the same healthy reading.
///
/// Scaled, each sensor reads: vibration 1.0/0.1/0.5/0.05, temperature 25.0 °C,
/// all thresholds 0.1, temperature warning 60, alarm 80, motor running, and
/// every additional statistic 1.0.
pub fn sample_register_image(sensor_count: u16) -> RegisterImage {
    let mut image = RegisterImage::new();
    for sensor in 0..sensor_count {
        write_block(&mut image, RegisterBlock::Primary, sensor, &SAMPLE_PRIMARY);
        write_block(&mut image, RegisterBlock::Threshold, sensor, &SAMPLE_THRESHOLD);
        write_block(
            &mut image,
            RegisterBlock::TemperatureWarning,
            sensor,
            &[SAMPLE_TEMPERATURE_WARNING],
        );
        write_block(
            &mut image,
            RegisterBlock::TemperatureAlarm,
            sensor,
            &[SAMPLE_TEMPERATURE_ALARM],
        );
        write_block(
            &mut image,
            RegisterBlock::MotorStatus,
            sensor,
            &[SAMPLE_MOTOR_RUNNING],
        );
        write_block(
            &mut image,
            RegisterBlock::AdditionalStats,
            sensor,
            &SAMPLE_ADDITIONAL,
        );
    }
    image
}

/// Store `raw` at the block's address for `sensor`.
pub fn write_block(image: &mut RegisterImage, block: RegisterBlock, sensor: u16, raw: &[u16]) {
    let start = block.address(sensor);
    for (offset, word) in raw.iter().enumerate() {
        image.insert(start + offset as u16, *word);
    }
}

/// Helper function implementing reading registers from a HashMap.
///
/// Any address in the requested range that is not present in the image
/// answers `IllegalDataAddress`, like the controller does past its map.
pub(crate) fn register_read(
    registers: &RegisterImage,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let mut response_values = vec![0; cnt.into()];
    for i in 0..cnt {
        let value = addr
            .checked_add(i)
            .and_then(|reg_addr| registers.get(&reg_addr));
        match value {
            Some(r) => response_values[i as usize] = *r,
            None => {
                error!("SERVER: Exception::IllegalDataAddress");
                return Err(ExceptionCode::IllegalDataAddress);
            }
        }
    }

    Ok(response_values)
}

/// Write a holding register. Used by both the write single register
/// and write multiple registers requests.
fn register_write(
    registers: &mut RegisterImage,
    addr: u16,
    values: &[u16],
) -> Result<(), ExceptionCode> {
    for (i, value) in values.iter().enumerate() {
        let reg_addr = addr.checked_add(i as u16);
        match reg_addr.and_then(|reg_addr| registers.get_mut(&reg_addr)) {
            Some(r) => *r = *value,
            None => {
                error!("SERVER: Exception::IllegalDataAddress");
                return Err(ExceptionCode::IllegalDataAddress);
            }
        }
    }

    Ok(())
}

/// Serve `registers` on `listener` until the task is dropped or the listener fails.
pub async fn serve(listener: TcpListener, registers: SharedRegisters) -> io::Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!("Controller simulator listening on {}", local);
    }
    let server = Server::new(listener);

    let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
        let registers = Arc::clone(&registers);
        async move {
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(ControllerSimulator::new(Arc::clone(&registers))))
            })
        }
    };

    server
        .serve(&on_connected, |err| {
            error!("Modbus server error: {err}");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_image_covers_every_block() {
        let image = sample_register_image(3);
        for sensor in 0..3 {
            for block in RegisterBlock::ALL {
                let words = register_read(&image, block.address(sensor), block.count()).unwrap();
                assert_eq!(words.len(), block.count() as usize);
            }
        }
        assert_eq!(
            register_read(&image, RegisterBlock::Primary.address(2), 5).unwrap(),
            SAMPLE_PRIMARY.to_vec()
        );
    }

    #[test]
    fn test_read_outside_image_is_illegal_address() {
        let image = sample_register_image(1);
        assert_eq!(
            register_read(&image, RegisterBlock::Primary.address(1), 5),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            register_read(&image, u16::MAX, 2),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_write_only_existing_registers() {
        let mut image = sample_register_image(1);
        register_write(&mut image, 240, &[0]).unwrap();
        assert_eq!(image.get(&240), Some(&0));
        assert!(register_write(&mut image, 241, &[1]).is_err());
    }
}
