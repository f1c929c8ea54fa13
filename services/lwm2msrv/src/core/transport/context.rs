//! [`ModbusMaster`] over a tokio-modbus client context (TCP and RTU)

use async_trait::async_trait;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::{Reader, Slave, SlaveContext, Writer};

use super::ModbusMaster;
use crate::error::{Lwm2mSrvError, Result};

/// Map tokio-modbus' nested result onto `OperationError`
fn flatten<T>(op: &str, result: tokio_modbus::Result<T>) -> Result<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(Lwm2mSrvError::operation(format!(
            "{}: exception: {}",
            op, exception
        ))),
        Err(err) => Err(Lwm2mSrvError::operation(format!(
            "{}: transport: {}",
            op, err
        ))),
    }
}

#[async_trait]
impl ModbusMaster for Context {
    async fn read_coils(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<bool>> {
        self.set_slave(Slave(slave));
        flatten("read coils", Reader::read_coils(self, addr, qty).await)
    }

    async fn read_discrete_inputs(
        &mut self,
        slave: u8,
        addr: u16,
        qty: u16,
    ) -> Result<Vec<bool>> {
        self.set_slave(Slave(slave));
        flatten(
            "read discrete inputs",
            Reader::read_discrete_inputs(self, addr, qty).await,
        )
    }

    async fn read_holding_registers(
        &mut self,
        slave: u8,
        addr: u16,
        qty: u16,
    ) -> Result<Vec<u16>> {
        self.set_slave(Slave(slave));
        flatten(
            "read holding registers",
            Reader::read_holding_registers(self, addr, qty).await,
        )
    }

    async fn read_input_registers(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<u16>> {
        self.set_slave(Slave(slave));
        flatten(
            "read input registers",
            Reader::read_input_registers(self, addr, qty).await,
        )
    }

    async fn write_single_coil(&mut self, slave: u8, addr: u16, value: bool) -> Result<()> {
        self.set_slave(Slave(slave));
        flatten(
            "write single coil",
            Writer::write_single_coil(self, addr, value).await,
        )
    }

    async fn write_multiple_coils(&mut self, slave: u8, addr: u16, values: &[bool]) -> Result<()> {
        self.set_slave(Slave(slave));
        flatten(
            "write multiple coils",
            Writer::write_multiple_coils(self, addr, values).await,
        )
    }

    async fn write_single_register(&mut self, slave: u8, addr: u16, value: u16) -> Result<()> {
        self.set_slave(Slave(slave));
        flatten(
            "write single register",
            Writer::write_single_register(self, addr, value).await,
        )
    }

    async fn write_multiple_registers(
        &mut self,
        slave: u8,
        addr: u16,
        values: &[u16],
    ) -> Result<()> {
        self.set_slave(Slave(slave));
        flatten(
            "write multiple registers",
            Writer::write_multiple_registers(self, addr, values).await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_modbus::ExceptionCode;

    #[test]
    fn test_flatten_exception_and_transport_errors() {
        let ok: tokio_modbus::Result<u16> = Ok(Ok(7));
        assert_eq!(flatten("read", ok).unwrap(), 7);

        let exception: tokio_modbus::Result<u16> = Ok(Err(ExceptionCode::IllegalDataAddress));
        let err = flatten("read input registers", exception).unwrap_err();
        assert!(matches!(err, Lwm2mSrvError::OperationError(_)));
        assert!(err.to_string().contains("exception"));

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "bus down");
        let transport: tokio_modbus::Result<u16> = Err(tokio_modbus::Error::Transport(io));
        let err = flatten("read coils", transport).unwrap_err();
        assert!(err.to_string().contains("transport"));
        assert!(err.to_string().contains("bus down"));
    }
}
