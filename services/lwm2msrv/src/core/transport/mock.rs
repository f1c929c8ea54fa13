//! In-memory Modbus master for unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::ModbusMaster;
use crate::error::{Lwm2mSrvError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    ReadCoils { slave: u8, addr: u16, qty: u16 },
    ReadDiscreteInputs { slave: u8, addr: u16, qty: u16 },
    ReadHoldingRegisters { slave: u8, addr: u16, qty: u16 },
    ReadInputRegisters { slave: u8, addr: u16, qty: u16 },
    WriteSingleCoil { slave: u8, addr: u16, value: bool },
    WriteMultipleCoils { slave: u8, addr: u16, values: Vec<bool> },
    WriteSingleRegister { slave: u8, addr: u16, value: u16 },
    WriteMultipleRegisters { slave: u8, addr: u16, values: Vec<u16> },
}

#[derive(Debug, Default)]
struct MockState {
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
    holding_registers: HashMap<u16, u16>,
    input_registers: HashMap<u16, u16>,
    calls: Vec<MockCall>,
    fail_next: Option<String>,
    stall_next: Option<Duration>,
    resyncs: usize,
}

/// Scriptable slave tables; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockMaster {
    state: Arc<Mutex<MockState>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockMaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_coil(&self, addr: u16, value: bool) {
        self.state().coils.insert(addr, value);
    }

    pub fn set_discrete_input(&self, addr: u16, value: bool) {
        self.state().discrete_inputs.insert(addr, value);
    }

    pub fn set_holding_register(&self, addr: u16, value: u16) {
        self.state().holding_registers.insert(addr, value);
    }

    pub fn set_input_register(&self, addr: u16, value: u16) {
        self.state().input_registers.insert(addr, value);
    }

    pub fn coil(&self, addr: u16) -> bool {
        self.state().coils.get(&addr).copied().unwrap_or_default()
    }

    pub fn holding_register(&self, addr: u16) -> u16 {
        self.state()
            .holding_registers
            .get(&addr)
            .copied()
            .unwrap_or_default()
    }

    /// Next call fails with an `OperationError` carrying `msg`
    pub fn fail_next(&self, msg: impl Into<String>) {
        self.state().fail_next = Some(msg.into());
    }

    /// Next call sleeps for `delay` before answering
    pub fn stall_next(&self, delay: Duration) {
        self.state().stall_next = Some(delay);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn resync_count(&self) -> usize {
        self.state().resyncs
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn begin(&self, call: MockCall) -> Result<InFlight<'_>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let (stall, fail) = {
            let mut state = self.state();
            state.calls.push(call);
            (state.stall_next.take(), state.fail_next.take())
        };

        tokio::task::yield_now().await;
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        match fail {
            Some(msg) => Err(Lwm2mSrvError::operation(msg)),
            None => Ok(guard),
        }
    }

    fn bits(table: &HashMap<u16, bool>, addr: u16, qty: u16) -> Vec<bool> {
        (0..qty)
            .map(|i| table.get(&addr.wrapping_add(i)).copied().unwrap_or_default())
            .collect()
    }

    fn words(table: &HashMap<u16, u16>, addr: u16, qty: u16) -> Vec<u16> {
        (0..qty)
            .map(|i| table.get(&addr.wrapping_add(i)).copied().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl ModbusMaster for MockMaster {
    async fn read_coils(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<bool>> {
        let _guard = self.begin(MockCall::ReadCoils { slave, addr, qty }).await?;
        Ok(Self::bits(&self.state().coils, addr, qty))
    }

    async fn read_discrete_inputs(
        &mut self,
        slave: u8,
        addr: u16,
        qty: u16,
    ) -> Result<Vec<bool>> {
        let _guard = self
            .begin(MockCall::ReadDiscreteInputs { slave, addr, qty })
            .await?;
        Ok(Self::bits(&self.state().discrete_inputs, addr, qty))
    }

    async fn read_holding_registers(
        &mut self,
        slave: u8,
        addr: u16,
        qty: u16,
    ) -> Result<Vec<u16>> {
        let _guard = self
            .begin(MockCall::ReadHoldingRegisters { slave, addr, qty })
            .await?;
        Ok(Self::words(&self.state().holding_registers, addr, qty))
    }

    async fn read_input_registers(&mut self, slave: u8, addr: u16, qty: u16) -> Result<Vec<u16>> {
        let _guard = self
            .begin(MockCall::ReadInputRegisters { slave, addr, qty })
            .await?;
        Ok(Self::words(&self.state().input_registers, addr, qty))
    }

    async fn write_single_coil(&mut self, slave: u8, addr: u16, value: bool) -> Result<()> {
        let _guard = self
            .begin(MockCall::WriteSingleCoil { slave, addr, value })
            .await?;
        self.state().coils.insert(addr, value);
        Ok(())
    }

    async fn write_multiple_coils(&mut self, slave: u8, addr: u16, values: &[bool]) -> Result<()> {
        let _guard = self
            .begin(MockCall::WriteMultipleCoils {
                slave,
                addr,
                values: values.to_vec(),
            })
            .await?;
        let mut state = self.state();
        for (i, v) in values.iter().enumerate() {
            state.coils.insert(addr.wrapping_add(i as u16), *v);
        }
        Ok(())
    }

    async fn write_single_register(&mut self, slave: u8, addr: u16, value: u16) -> Result<()> {
        let _guard = self
            .begin(MockCall::WriteSingleRegister { slave, addr, value })
            .await?;
        self.state().holding_registers.insert(addr, value);
        Ok(())
    }

    async fn write_multiple_registers(
        &mut self,
        slave: u8,
        addr: u16,
        values: &[u16],
    ) -> Result<()> {
        let _guard = self
            .begin(MockCall::WriteMultipleRegisters {
                slave,
                addr,
                values: values.to_vec(),
            })
            .await?;
        let mut state = self.state();
        for (i, v) in values.iter().enumerate() {
            state.holding_registers.insert(addr.wrapping_add(i as u16), *v);
        }
        Ok(())
    }

    async fn resync(&mut self, _window: Duration) -> Result<()> {
        self.state().resyncs += 1;
        Ok(())
    }
}
