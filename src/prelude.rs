pub use crate::bus::ports::{EgressTx, IngressRx, PortChannel, PortReceiver, PortSender};
pub use crate::bus::{IngressEvent, Publication, Topic, Topics};
pub use crate::config::RuntimeConfig;
pub use crate::device::drivers::{IoDriver, NullDrivers, OneWireBus};
pub use crate::runtime::{Runtime, RuntimeGuard};
pub use crate::storage::{BlobStore, MemoryBlobStore};
pub use crate::store::VarStore;
pub use crate::utils::{CancelToken, HealthFlag};
