mod error;
mod hypervisor;
#[cfg(feature = "libvirt")]
mod libvirt;
mod memory;
mod types;

pub use error::HypervisorError;
pub use hypervisor::{Hypervisor, StoragePool};
#[cfg(feature = "libvirt")]
pub use libvirt::{LibvirtHypervisor, LibvirtPool};
pub use memory::{MemoryHypervisor, MemoryPool};
pub use types::*;
