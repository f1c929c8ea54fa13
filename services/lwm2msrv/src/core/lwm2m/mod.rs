//! LwM2M side of the adapter: resource values, response types and the
//! collaborator seams (instance enabler, change notification)

pub mod enabler;
pub mod node;
pub mod notify;
pub mod response;

pub use enabler::InstanceEnabler;
pub use node::{LwM2mResource, ResourceType, ResourceValue, Value};
pub use notify::{BroadcastNotifier, ChangeNotifier, NoopNotifier, ResourceChange};
pub use response::{ReadResponse, ResponseCode, WriteResponse};
