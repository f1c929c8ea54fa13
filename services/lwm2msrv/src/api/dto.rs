//! Request and response bodies of the resource API

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::config::{RegisterType, ResourceSpec};
use crate::core::lwm2m::{LwM2mResource, ResourceType, ResourceValue, Value};

#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    pub id: u16,
    #[serde(rename = "type")]
    pub register_type: RegisterType,
    pub start_address: u16,
    pub quantity: u16,
    pub multiple: bool,
    pub writable: bool,
}

impl ResourceSummary {
    pub fn new(id: u16, spec: &ResourceSpec) -> Self {
        Self {
            id,
            register_type: spec.register_type,
            start_address: spec.start_address,
            quantity: spec.quantity,
            multiple: spec.is_multiple(),
            writable: spec.register_type.is_writable(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub instance_id: u16,
    pub resources: Vec<ResourceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub object_id: u16,
    pub instances: Vec<InstanceSummary>,
}

/// Read result: `value` for single resources, `values` for multi-instance ones
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDto {
    pub path: String,
    pub id: u16,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<u16, Value>>,
}

impl ResourceDto {
    pub fn new(path: String, resource: &LwM2mResource) -> Self {
        match &resource.value {
            ResourceValue::Single(v) => Self {
                path,
                id: resource.id,
                kind: v.kind(),
                value: Some(v.clone()),
                values: None,
            },
            ResourceValue::Multiple { kind, instances } => Self {
                path,
                id: resource.id,
                kind: *kind,
                value: None,
                values: Some(instances.clone()),
            },
        }
    }
}

/// `{"value": 1}` or `{"values": {"0": 1, "1": 2}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteRequest {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub values: Option<BTreeMap<u16, Value>>,
}

impl WriteRequest {
    pub fn into_resource(self, id: u16) -> Result<LwM2mResource, String> {
        match (self.value, self.values) {
            (Some(value), None) => Ok(LwM2mResource::new_single(id, value)),
            (None, Some(instances)) => {
                let kind = instances
                    .values()
                    .next()
                    .map_or(ResourceType::Integer, Value::kind);
                Ok(LwM2mResource::new_multiple(id, kind, instances))
            },
            (Some(_), Some(_)) => Err("give either 'value' or 'values', not both".to_string()),
            (None, None) => Err("missing 'value' or 'values'".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResult {
    pub path: String,
    /// CoAP response code, e.g. `2.04`
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelRequest {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
}
