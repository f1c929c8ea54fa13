//! Object instances built from the mapping
//!
//! Plays the role of the LwM2M client's object initializer: for every
//! configured object id one [`ModbusSensor`] per instance, instance ids
//! assigned in file order starting at 0.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::core::config::MappingConfig;
use crate::core::lwm2m::{
    ChangeNotifier, InstanceEnabler, LwM2mResource, ReadResponse, WriteResponse,
};
use crate::core::sensor::ModbusSensor;
use crate::core::transport::TransportHandle;

pub struct ObjectRegistry {
    objects: BTreeMap<u16, Vec<ModbusSensor>>,
    transport: Arc<TransportHandle>,
}

impl ObjectRegistry {
    pub fn build(
        config: &MappingConfig,
        transport: Arc<TransportHandle>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        let mut objects = BTreeMap::new();

        for (&object_id, instances) in &config.objects {
            let sensors: Vec<ModbusSensor> = instances
                .iter()
                .enumerate()
                .map(|(instance_id, resources)| {
                    ModbusSensor::new(
                        object_id,
                        instance_id as u16,
                        config.slave_id,
                        resources.clone(),
                        transport.clone(),
                        notifier.clone(),
                    )
                })
                .collect();

            info!(
                "Object {} registered with {} instance(s)",
                object_id,
                sensors.len()
            );
            objects.insert(object_id, sensors);
        }

        Self { objects, transport }
    }

    pub fn transport(&self) -> &Arc<TransportHandle> {
        &self.transport
    }

    pub fn object_ids(&self) -> Vec<u16> {
        self.objects.keys().copied().collect()
    }

    pub fn instance_count(&self, object_id: u16) -> usize {
        self.objects.get(&object_id).map_or(0, Vec::len)
    }

    pub fn sensor(&self, object_id: u16, instance_id: u16) -> Option<&ModbusSensor> {
        self.objects
            .get(&object_id)
            .and_then(|instances| instances.get(usize::from(instance_id)))
    }

    pub fn instances(&self, object_id: u16) -> &[ModbusSensor] {
        self.objects
            .get(&object_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub async fn read(&self, object_id: u16, instance_id: u16, resource_id: u16) -> ReadResponse {
        match self.sensor(object_id, instance_id) {
            Some(sensor) => sensor.read(resource_id).await,
            None => ReadResponse::NotFound,
        }
    }

    pub async fn write(
        &self,
        object_id: u16,
        instance_id: u16,
        resource_id: u16,
        value: &LwM2mResource,
    ) -> WriteResponse {
        match self.sensor(object_id, instance_id) {
            Some(sensor) => sensor.write(resource_id, value).await,
            None => WriteResponse::NotFound,
        }
    }
}
