#[macro_use]
mod value;

mod builder;
mod capabilities;
mod descriptor;
mod error;
mod mac;
mod storage;

pub use builder::{DirectBoot, DomainBuilder};
pub use capabilities::{Capabilities, Host};
pub use descriptor::*;
pub use error::DomainError;
pub use mac::MacAddress;
pub use storage::{StorageFormat, StoragePermissions, StoragePool, StorageTarget, StorageVolume};
pub use value::{Amount, Unit};
