//! Resource translator for one LwM2M object instance
//!
//! Maps `read`/`write` on a resource id to the Modbus call described by the
//! instance's [`ResourceMap`], converting register and bit arrays to and
//! from LwM2M values.
//!
//! | register type    | read                 | write                          |
//! |------------------|----------------------|--------------------------------|
//! | holding-register | 0x03, integer(s)     | 0x06 scalar / 0x10 multiple    |
//! | input-register   | 0x04, integer(s)     | not found                      |
//! | coil             | 0x01, boolean(s)     | 0x05 scalar / 0x0F multiple    |
//! | discrete-input   | 0x02, boolean(s)     | not found                      |
//!
//! `quantity == 0` reads one unit and answers a single value; `quantity > 0`
//! answers a multi-instance resource keyed `0..n`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::core::config::{RegisterType, ResourceMap, ResourceSpec};
use crate::core::lwm2m::{
    ChangeNotifier, InstanceEnabler, LwM2mResource, ReadResponse, ResourceChange, ResourceType,
    ResourceValue, Value, WriteResponse,
};
use crate::core::marshal::{array_to_index_map, index_map_to_array, is_dense};
use crate::core::transport::TransportHandle;
use crate::error::{Lwm2mSrvError, Result};

/// Decoded write request, ready for the bus
#[derive(Debug, Clone, PartialEq, Eq)]
enum WritePayload {
    Register(u16),
    Registers(Vec<u16>),
    Coil(bool),
    Coils(Vec<bool>),
}

pub struct ModbusSensor {
    object_id: u16,
    instance_id: u16,
    slave_id: u8,
    resources: ResourceMap,
    transport: Arc<TransportHandle>,
    notifier: Arc<dyn ChangeNotifier>,
}

impl ModbusSensor {
    pub fn new(
        object_id: u16,
        instance_id: u16,
        slave_id: u8,
        resources: ResourceMap,
        transport: Arc<TransportHandle>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            object_id,
            instance_id,
            slave_id,
            resources,
            transport,
            notifier,
        }
    }

    pub fn object_id(&self) -> u16 {
        self.object_id
    }

    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    fn path(&self, resource_id: u16) -> String {
        format!("/{}/{}/{}", self.object_id, self.instance_id, resource_id)
    }

    async fn read_resource(&self, resource_id: u16, spec: &ResourceSpec) -> Result<LwM2mResource> {
        let slave = self.slave_id;
        let addr = spec.start_address;
        let qty = spec.effective_quantity();

        match spec.register_type {
            RegisterType::HoldingRegister => {
                let words = self
                    .transport
                    .read_holding_registers(slave, addr, qty)
                    .await?;
                word_resource(resource_id, spec, words)
            },
            RegisterType::InputRegister => {
                let words = self.transport.read_input_registers(slave, addr, qty).await?;
                word_resource(resource_id, spec, words)
            },
            RegisterType::Coil => {
                let bits = self.transport.read_coils(slave, addr, qty).await?;
                bit_resource(resource_id, spec, bits)
            },
            RegisterType::DiscreteInput => {
                let bits = self.transport.read_discrete_inputs(slave, addr, qty).await?;
                bit_resource(resource_id, spec, bits)
            },
        }
    }

    async fn send(&self, spec: &ResourceSpec, payload: WritePayload) -> Result<()> {
        let slave = self.slave_id;
        let addr = spec.start_address;

        match payload {
            WritePayload::Register(word) => {
                self.transport
                    .write_single_register(slave, addr, word)
                    .await
            },
            WritePayload::Registers(words) => {
                self.transport
                    .write_multiple_registers(slave, addr, &words)
                    .await
            },
            WritePayload::Coil(bit) => self.transport.write_single_coil(slave, addr, bit).await,
            WritePayload::Coils(bits) => {
                self.transport
                    .write_multiple_coils(slave, addr, &bits)
                    .await
            },
        }
    }
}

fn word_resource(resource_id: u16, spec: &ResourceSpec, words: Vec<u16>) -> Result<LwM2mResource> {
    if spec.is_multiple() {
        let values: Vec<Value> = words.into_iter().map(Value::from).collect();
        return Ok(LwM2mResource::new_multiple(
            resource_id,
            ResourceType::Integer,
            array_to_index_map(&values),
        ));
    }

    let first = words
        .first()
        .copied()
        .ok_or_else(|| Lwm2mSrvError::operation("slave returned no registers"))?;
    Ok(LwM2mResource::new_single(resource_id, first))
}

fn bit_resource(resource_id: u16, spec: &ResourceSpec, bits: Vec<bool>) -> Result<LwM2mResource> {
    if spec.is_multiple() {
        let values: Vec<Value> = bits.into_iter().map(Value::from).collect();
        return Ok(LwM2mResource::new_multiple(
            resource_id,
            ResourceType::Boolean,
            array_to_index_map(&values),
        ));
    }

    let first = bits
        .first()
        .copied()
        .ok_or_else(|| Lwm2mSrvError::operation("slave returned no bits"))?;
    Ok(LwM2mResource::new_single(resource_id, first))
}

/// Register word for an integer value; negatives are stored as two's complement
fn to_word(value: &Value) -> std::result::Result<u16, String> {
    match value.as_integer() {
        Some(v) if (0..=i64::from(u16::MAX)).contains(&v) => Ok(v as u16),
        Some(v) if (i64::from(i16::MIN)..0).contains(&v) => Ok(v as i16 as u16),
        Some(v) => Err(format!("{} does not fit a 16-bit register", v)),
        None => Err(format!("expected an integer, got {:?}", value.kind())),
    }
}

fn to_bit(value: &Value) -> std::result::Result<bool, String> {
    value
        .as_boolean()
        .ok_or_else(|| format!("expected a boolean, got {:?}", value.kind()))
}

fn dense_values(
    instances: &BTreeMap<u16, Value>,
    max: u16,
) -> std::result::Result<Vec<Value>, String> {
    if instances.is_empty() {
        return Err("multi-instance value has no instances".to_string());
    }
    if !is_dense(instances) {
        return Err("instance ids must be 0..n without gaps".to_string());
    }
    if instances.len() > usize::from(max) {
        return Err(format!(
            "{} values exceed the {} allowed in one request",
            instances.len(),
            max
        ));
    }
    Ok(index_map_to_array(instances))
}

fn write_payload(
    spec: &ResourceSpec,
    value: &ResourceValue,
) -> std::result::Result<WritePayload, String> {
    let max = spec.register_type.max_write_quantity();

    let payload = match (spec.register_type, value) {
        (RegisterType::HoldingRegister, ResourceValue::Multiple { instances, .. }) => {
            let words = dense_values(instances, max)?
                .iter()
                .map(to_word)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            WritePayload::Registers(words)
        },
        (RegisterType::HoldingRegister, ResourceValue::Single(v)) => {
            WritePayload::Register(to_word(v)?)
        },
        (RegisterType::Coil, ResourceValue::Multiple { instances, .. }) => {
            let bits = dense_values(instances, max)?
                .iter()
                .map(to_bit)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            WritePayload::Coils(bits)
        },
        (RegisterType::Coil, ResourceValue::Single(v)) => WritePayload::Coil(to_bit(v)?),
        (other, _) => return Err(format!("{} is read-only", other)),
    };

    let len = match &payload {
        WritePayload::Registers(words) => words.len(),
        WritePayload::Coils(bits) => bits.len(),
        WritePayload::Register(_) | WritePayload::Coil(_) => 1,
    };
    if u32::from(spec.start_address) + len as u32 > 0x1_0000 {
        return Err(format!(
            "{} values from address {} exceed the Modbus address space",
            len, spec.start_address
        ));
    }

    Ok(payload)
}

#[async_trait]
impl InstanceEnabler for ModbusSensor {
    async fn read(&self, resource_id: u16) -> ReadResponse {
        debug!("Read on Device Resource {}", self.path(resource_id));

        let Some(spec) = self.resources.get(&resource_id) else {
            return ReadResponse::NotFound;
        };

        match self.read_resource(resource_id, spec).await {
            Ok(resource) => ReadResponse::Content(resource),
            Err(e) => {
                error!(
                    "an error occurred during read() on {}: {}",
                    self.path(resource_id),
                    e
                );
                ReadResponse::InternalServerError(e.to_string())
            },
        }
    }

    async fn write(&self, resource_id: u16, value: &LwM2mResource) -> WriteResponse {
        debug!(
            "Write on Device Resource {} value {}",
            self.path(resource_id),
            value
        );

        let Some(spec) = self.resources.get(&resource_id) else {
            return WriteResponse::NotFound;
        };
        // Input registers and discrete inputs never reach the bus
        if !spec.register_type.is_writable() {
            return WriteResponse::NotFound;
        }

        let payload = match write_payload(spec, &value.value) {
            Ok(payload) => payload,
            Err(reason) => {
                debug!("Rejected write on {}: {}", self.path(resource_id), reason);
                return WriteResponse::BadRequest(reason);
            },
        };

        match self.send(spec, payload).await {
            Ok(()) => {
                self.notifier.resource_changed(ResourceChange {
                    object_id: self.object_id,
                    instance_id: self.instance_id,
                    resource_id,
                });
                WriteResponse::Changed
            },
            Err(e) => {
                error!(
                    "an error occurred during write() on {}: {}",
                    self.path(resource_id),
                    e
                );
                WriteResponse::InternalServerError(e.to_string())
            },
        }
    }

    fn resource_ids(&self) -> Vec<u16> {
        self.resources.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConnectionKind;
    use crate::core::transport::mock::{MockCall, MockMaster};
    use std::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingNotifier {
        changes: Mutex<Vec<ResourceChange>>,
    }

    impl RecordingNotifier {
        fn changes(&self) -> Vec<ResourceChange> {
            self.changes.lock().unwrap().clone()
        }
    }

    impl ChangeNotifier for RecordingNotifier {
        fn resource_changed(&self, change: ResourceChange) {
            self.changes.lock().unwrap().push(change);
        }
    }

    fn spec(register_type: RegisterType, start_address: u16, quantity: u16) -> ResourceSpec {
        ResourceSpec {
            register_type,
            start_address,
            quantity,
            poll_interval_ms: 0,
        }
    }

    fn sensor(
        resources: &[(u16, ResourceSpec)],
    ) -> (ModbusSensor, MockMaster, Arc<RecordingNotifier>) {
        let mock = MockMaster::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let transport = Arc::new(TransportHandle::new(
            ConnectionKind::Tcp,
            "mock",
            Box::new(mock.clone()),
        ));
        let sensor = ModbusSensor::new(
            3303,
            0,
            1,
            resources.iter().copied().collect(),
            transport,
            notifier.clone(),
        );
        (sensor, mock, notifier)
    }

    fn integers(values: &[i64]) -> BTreeMap<u16, Value> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u16, Value::Integer(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_scalar_input_register_read() {
        let (sensor, mock, _) = sensor(&[(5700, spec(RegisterType::InputRegister, 0, 0))]);
        mock.set_input_register(0, 237);

        let response = sensor.read(5700).await;
        assert_eq!(
            response,
            ReadResponse::Content(LwM2mResource::new_single(5700, Value::Integer(237)))
        );
        assert_eq!(
            mock.calls(),
            vec![MockCall::ReadInputRegisters {
                slave: 1,
                addr: 0,
                qty: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_multiple_holding_registers_read() {
        let (sensor, mock, _) = sensor(&[(5700, spec(RegisterType::HoldingRegister, 20, 3))]);
        mock.set_holding_register(20, 1);
        mock.set_holding_register(21, 2);
        mock.set_holding_register(22, 3);

        let response = sensor.read(5700).await;
        let resource = response.content().unwrap();
        assert!(resource.is_multi_instances());
        assert_eq!(resource.instances().unwrap(), &integers(&[1, 2, 3]));
        match &resource.value {
            ResourceValue::Multiple { kind, .. } => assert_eq!(*kind, ResourceType::Integer),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bit_reads() {
        let (sensor, mock, _) = sensor(&[
            (5850, spec(RegisterType::Coil, 0, 0)),
            (5500, spec(RegisterType::DiscreteInput, 4, 2)),
        ]);
        mock.set_coil(0, true);
        mock.set_discrete_input(5, true);

        assert_eq!(
            sensor.read(5850).await,
            ReadResponse::Content(LwM2mResource::new_single(5850, true))
        );

        let multi = sensor.read(5500).await;
        let instances = multi.content().unwrap().instances().unwrap().clone();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[&0], Value::Boolean(false));
        assert_eq!(instances[&1], Value::Boolean(true));
    }

    #[tokio::test]
    async fn test_unmapped_resource_is_not_found() {
        let (sensor, mock, _) = sensor(&[(5700, spec(RegisterType::InputRegister, 0, 0))]);

        assert_eq!(sensor.read(5701).await, ReadResponse::NotFound);
        assert_eq!(
            sensor
                .write(5701, &LwM2mResource::new_single(5701, 1i64))
                .await,
            WriteResponse::NotFound
        );
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_read_only_writes_never_touch_transport() {
        let (sensor, mock, notifier) = sensor(&[
            (1, spec(RegisterType::InputRegister, 0, 0)),
            (2, spec(RegisterType::DiscreteInput, 0, 4)),
        ]);

        let scalar = LwM2mResource::new_single(1, 5i64);
        assert_eq!(sensor.write(1, &scalar).await, WriteResponse::NotFound);

        let multi = LwM2mResource::new_multiple(
            2,
            ResourceType::Boolean,
            [(0, Value::Boolean(true))].into_iter().collect(),
        );
        assert_eq!(sensor.write(2, &multi).await, WriteResponse::NotFound);

        assert_eq!(mock.call_count(), 0);
        assert!(notifier.changes().is_empty());
    }

    #[tokio::test]
    async fn test_multiple_register_write_issues_one_call_and_one_notification() {
        let (sensor, mock, notifier) =
            sensor(&[(5700, spec(RegisterType::HoldingRegister, 20, 4))]);

        let value = LwM2mResource::new_multiple(
            5700,
            ResourceType::Integer,
            integers(&[10, 20, 30, 40]),
        );
        assert_eq!(sensor.write(5700, &value).await, WriteResponse::Changed);

        assert_eq!(
            mock.calls(),
            vec![MockCall::WriteMultipleRegisters {
                slave: 1,
                addr: 20,
                values: vec![10, 20, 30, 40]
            }]
        );
        assert_eq!(
            notifier.changes(),
            vec![ResourceChange {
                object_id: 3303,
                instance_id: 0,
                resource_id: 5700
            }]
        );
    }

    #[tokio::test]
    async fn test_scalar_writes() {
        let (sensor, mock, notifier) = sensor(&[
            (5851, spec(RegisterType::HoldingRegister, 10, 0)),
            (5850, spec(RegisterType::Coil, 3, 0)),
        ]);

        let dimmer = LwM2mResource::new_single(5851, -2i64);
        assert_eq!(sensor.write(5851, &dimmer).await, WriteResponse::Changed);
        assert_eq!(mock.holding_register(10), 0xFFFE);

        let switch = LwM2mResource::new_single(5850, true);
        assert_eq!(sensor.write(5850, &switch).await, WriteResponse::Changed);
        assert!(mock.coil(3));

        assert_eq!(
            mock.calls(),
            vec![
                MockCall::WriteSingleRegister {
                    slave: 1,
                    addr: 10,
                    value: 0xFFFE
                },
                MockCall::WriteSingleCoil {
                    slave: 1,
                    addr: 3,
                    value: true
                },
            ]
        );
        assert_eq!(notifier.changes().len(), 2);
    }

    #[tokio::test]
    async fn test_multiple_coil_write() {
        let (sensor, mock, _) = sensor(&[(5750, spec(RegisterType::Coil, 8, 3))]);

        let value = LwM2mResource::new_multiple(
            5750,
            ResourceType::Boolean,
            [
                (0, Value::Boolean(true)),
                (1, Value::Boolean(false)),
                (2, Value::Boolean(true)),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(sensor.write(5750, &value).await, WriteResponse::Changed);
        assert_eq!(
            mock.calls(),
            vec![MockCall::WriteMultipleCoils {
                slave: 1,
                addr: 8,
                values: vec![true, false, true]
            }]
        );
    }

    #[tokio::test]
    async fn test_mistyped_writes_are_bad_requests() {
        let (sensor, mock, notifier) = sensor(&[
            (1, spec(RegisterType::HoldingRegister, 0, 0)),
            (2, spec(RegisterType::Coil, 0, 0)),
        ]);

        let cases = [
            (1, LwM2mResource::new_single(1, true)),
            (1, LwM2mResource::new_single(1, 70000i64)),
            (2, LwM2mResource::new_single(2, 1i64)),
            (
                1,
                LwM2mResource::new_multiple(
                    1,
                    ResourceType::Integer,
                    [(0, Value::Integer(1)), (2, Value::Integer(2))]
                        .into_iter()
                        .collect(),
                ),
            ),
            (
                1,
                LwM2mResource::new_multiple(1, ResourceType::Integer, BTreeMap::new()),
            ),
        ];
        for (id, value) in cases {
            let response = sensor.write(id, &value).await;
            assert!(
                matches!(response, WriteResponse::BadRequest(_)),
                "{} -> {:?}",
                value,
                response
            );
        }

        assert_eq!(mock.call_count(), 0);
        assert!(notifier.changes().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fault_is_internal_error_and_handle_survives() {
        let (sensor, mock, notifier) = sensor(&[
            (5700, spec(RegisterType::InputRegister, 0, 0)),
            (5851, spec(RegisterType::HoldingRegister, 10, 0)),
        ]);
        mock.set_input_register(0, 237);

        mock.fail_next("bus fault");
        match sensor.read(5700).await {
            ReadResponse::InternalServerError(msg) => assert!(msg.contains("bus fault")),
            other => panic!("unexpected response {:?}", other),
        }
        assert!(logs_contain("an error occurred during read() on /3303/0/5700"));
        assert_eq!(
            sensor.read(5700).await,
            ReadResponse::Content(LwM2mResource::new_single(5700, 237u16))
        );

        mock.fail_next("crc error");
        let write = sensor
            .write(5851, &LwM2mResource::new_single(5851, 1i64))
            .await;
        assert!(matches!(write, WriteResponse::InternalServerError(_)));
        assert!(notifier.changes().is_empty());
    }

    #[test]
    fn test_to_word_range() {
        assert_eq!(to_word(&Value::Integer(0)), Ok(0));
        assert_eq!(to_word(&Value::Integer(65535)), Ok(65535));
        assert_eq!(to_word(&Value::Integer(-32768)), Ok(0x8000));
        assert!(to_word(&Value::Integer(65536)).is_err());
        assert!(to_word(&Value::Integer(-32769)).is_err());
        assert!(to_word(&Value::Float(1.0)).is_err());
    }
}
