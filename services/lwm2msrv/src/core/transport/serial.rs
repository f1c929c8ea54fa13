//! Serial links: Modbus RTU and Modbus ASCII

use async_trait::async_trait;
use std::time::Duration;
use tokio_modbus::client::{rtu, Context};
use tokio_modbus::prelude::Slave;
use tokio_serial::SerialStream;
use tracing::{debug, info};

use super::ascii::AsciiMaster;
use super::{ModbusMaster, DEFAULT_RESPONSE_TIMEOUT};
use crate::core::config::{AsciiSettings, Parity, RtuSettings};
use crate::error::{Lwm2mSrvError, Result};

pub fn map_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

pub fn map_data_bits(bits: u8) -> Result<tokio_serial::DataBits> {
    match bits {
        5 => Ok(tokio_serial::DataBits::Five),
        6 => Ok(tokio_serial::DataBits::Six),
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        other => Err(Lwm2mSrvError::config(format!(
            "Unsupported data bits: {}",
            other
        ))),
    }
}

pub fn map_stop_bits(bits: u8) -> Result<tokio_serial::StopBits> {
    match bits {
        1 => Ok(tokio_serial::StopBits::One),
        2 => Ok(tokio_serial::StopBits::Two),
        other => Err(Lwm2mSrvError::config(format!(
            "Unsupported stop bits: {}",
            other
        ))),
    }
}

fn open_port(
    device: &str,
    baud_rate: u32,
    data_bits: u8,
    stop_bits: u8,
    parity: Parity,
) -> Result<SerialStream> {
    let builder = tokio_serial::new(device, baud_rate)
        .data_bits(map_data_bits(data_bits)?)
        .stop_bits(map_stop_bits(stop_bits)?)
        .parity(map_parity(parity))
        .timeout(DEFAULT_RESPONSE_TIMEOUT);

    let stream = SerialStream::open(&builder).map_err(|e| {
        Lwm2mSrvError::connection(format!("Failed to open serial port {}: {}", device, e))
    })?;

    debug!(
        "Opened {} at {} baud {}{}{}",
        device, baud_rate, data_bits, parity, stop_bits
    );
    Ok(stream)
}

fn open_rtu(settings: &RtuSettings, slave_id: u8) -> Result<Context> {
    let stream = open_port(
        &settings.device_path,
        settings.baud_rate,
        settings.data_bits,
        settings.stop_bits,
        settings.parity,
    )?;

    Ok(rtu::attach_slave(stream, Slave(slave_id)))
}

/// RTU master that can reopen its port
///
/// RTU frames carry no transaction id, so after a timeout the only way to
/// get rid of a late reply is to wait it out and drop the port's buffers.
pub struct RtuMaster {
    context: Option<Context>,
    settings: RtuSettings,
    slave_id: u8,
}

impl std::fmt::Debug for RtuMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtuMaster")
            .field("device", &self.settings.device_path)
            .field("open", &self.context.is_some())
            .finish()
    }
}

impl RtuMaster {
    fn context(&mut self) -> Result<&mut Context> {
        self.context
            .as_mut()
            .ok_or_else(|| Lwm2mSrvError::operation("transport: serial port closed"))
    }
}

pub fn connect_rtu(settings: &RtuSettings, slave_id: u8) -> Result<RtuMaster> {
    Ok(RtuMaster {
        context: Some(open_rtu(settings, slave_id)?),
        settings: settings.clone(),
        slave_id,
    })
}

#[async_trait]
impl ModbusMaster for RtuMaster {
    async fn read_coils(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<bool>> {
        ModbusMaster::read_coils(self.context()?, slave, addr, qty).await
    }

    async fn read_discrete_inputs(
        &mut self,
        slave: u8,
        addr: u16,
        qty: u16,
    ) -> Result<Vec<bool>> {
        ModbusMaster::read_discrete_inputs(self.context()?, slave, addr, qty).await
    }

    async fn read_holding_registers(
        &mut self,
        slave: u8,
        addr: u16,
        qty: u16,
    ) -> Result<Vec<u16>> {
        ModbusMaster::read_holding_registers(self.context()?, slave, addr, qty).await
    }

    async fn read_input_registers(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<u16>> {
        ModbusMaster::read_input_registers(self.context()?, slave, addr, qty).await
    }

    async fn write_single_coil(&mut self, slave: u8, addr: u16, value: bool) -> Result<()> {
        ModbusMaster::write_single_coil(self.context()?, slave, addr, value).await
    }

    async fn write_multiple_coils(&mut self, slave: u8, addr: u16, values: &[bool]) -> Result<()> {
        ModbusMaster::write_multiple_coils(self.context()?, slave, addr, values).await
    }

    async fn write_single_register(&mut self, slave: u8, addr: u16, value: u16) -> Result<()> {
        ModbusMaster::write_single_register(self.context()?, slave, addr, value).await
    }

    async fn write_multiple_registers(
        &mut self,
        slave: u8,
        addr: u16,
        values: &[u16],
    ) -> Result<()> {
        ModbusMaster::write_multiple_registers(self.context()?, slave, addr, values).await
    }

    /// Close the port, let the late reply land, then reopen
    async fn resync(&mut self, window: Duration) -> Result<()> {
        // Port is opened exclusively; release it before reopening
        self.context = None;
        tokio::time::sleep(window).await;
        self.context = Some(open_rtu(&self.settings, self.slave_id)?);
        info!("Reopened {} after a timed-out exchange", self.settings.device_path);
        Ok(())
    }
}

pub fn connect_ascii(settings: &AsciiSettings) -> Result<AsciiMaster<SerialStream>> {
    let stream = open_port(
        &settings.device_path,
        settings.baud_rate,
        AsciiSettings::DATA_BITS,
        AsciiSettings::STOP_BITS,
        settings.parity,
    )?;

    Ok(AsciiMaster::new(stream))
}
