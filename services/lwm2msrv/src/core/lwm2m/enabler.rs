use async_trait::async_trait;

use super::node::LwM2mResource;
use super::response::{ReadResponse, WriteResponse};

/// Per object instance request entry points called by the LwM2M client
///
/// The default bodies are the "unsupported resource" answer.
#[async_trait]
pub trait InstanceEnabler: Send + Sync {
    async fn read(&self, resource_id: u16) -> ReadResponse {
        let _ = resource_id;
        ReadResponse::NotFound
    }

    async fn write(&self, resource_id: u16, value: &LwM2mResource) -> WriteResponse {
        let _ = (resource_id, value);
        WriteResponse::NotFound
    }

    /// Resource ids this instance answers for
    fn resource_ids(&self) -> Vec<u16> {
        Vec::new()
    }
}
