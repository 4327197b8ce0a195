use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("insufficient storage: {available} bytes available, {required} required")]
    InsufficientStorage { required: u64, available: u64 },

    #[error("storage pool not found: {0}")]
    PoolNotFound(String),

    #[error("hypervisor error: {0}")]
    Hypervisor(#[from] gegen_hypervisor::HypervisorError),

    #[error("descriptor error: {0}")]
    Domain(#[from] gegen_domain::DomainError),
}
