//! LwM2M resource values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Boolean,
    Integer,
    Float,
    String,
}

/// Scalar resource value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn kind(&self) -> ResourceType {
        match self {
            Value::Boolean(_) => ResourceType::Boolean,
            Value::Integer(_) => ResourceType::Integer,
            Value::Float(_) => ResourceType::Float,
            Value::String(_) => ResourceType::String,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Integer(i64::from(v))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Single(Value),
    /// Instance id -> value, all of `kind`
    Multiple {
        kind: ResourceType,
        instances: BTreeMap<u16, Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LwM2mResource {
    pub id: u16,
    pub value: ResourceValue,
}

impl LwM2mResource {
    pub fn new_single(id: u16, value: impl Into<Value>) -> Self {
        Self {
            id,
            value: ResourceValue::Single(value.into()),
        }
    }

    pub fn new_multiple(id: u16, kind: ResourceType, instances: BTreeMap<u16, Value>) -> Self {
        Self {
            id,
            value: ResourceValue::Multiple { kind, instances },
        }
    }

    pub fn is_multi_instances(&self) -> bool {
        matches!(self.value, ResourceValue::Multiple { .. })
    }

    /// Scalar value, `None` for multi-instance resources
    pub fn single(&self) -> Option<&Value> {
        match &self.value {
            ResourceValue::Single(v) => Some(v),
            ResourceValue::Multiple { .. } => None,
        }
    }

    pub fn instances(&self) -> Option<&BTreeMap<u16, Value>> {
        match &self.value {
            ResourceValue::Single(_) => None,
            ResourceValue::Multiple { instances, .. } => Some(instances),
        }
    }
}

impl fmt::Display for LwM2mResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ResourceValue::Single(v) => write!(f, "{}", v),
            ResourceValue::Multiple { instances, .. } => {
                write!(f, "{{")?;
                for (i, (id, v)) in instances.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", id, v)?;
                }
                write!(f, "}}")
            },
        }
    }
}
