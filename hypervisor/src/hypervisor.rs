use crate::error::HypervisorError;
use crate::types::*;
use async_trait::async_trait;

/// A session with a virtualization daemon.
///
/// Documents crossing this boundary are libvirt XML strings; parsing them is
/// the caller's concern.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    type Pool: StoragePool;

    async fn capabilities(&self) -> Result<String, HypervisorError>;

    async fn list_storage_pools(
        &self,
        filter: PoolFilter,
    ) -> Result<Vec<Self::Pool>, HypervisorError>;

    async fn lookup_storage_pool(&self, name: &str) -> Result<Self::Pool, HypervisorError>;

    /// Creates and starts a transient domain from its XML description.
    async fn create_domain(&self, xml: &str) -> Result<DomainHandle, HypervisorError>;

    async fn close(&self) -> Result<(), HypervisorError>;
}

#[async_trait]
pub trait StoragePool: Send + Sync {
    async fn name(&self) -> Result<String, HypervisorError>;

    async fn is_active(&self) -> Result<bool, HypervisorError>;

    async fn activate(&self) -> Result<(), HypervisorError>;

    async fn info(&self) -> Result<PoolInfo, HypervisorError>;

    async fn xml_desc(&self) -> Result<String, HypervisorError>;

    /// Returns `Ok(None)` only when the volume does not exist. Any other
    /// failure is reported as an error.
    async fn lookup_volume(&self, name: &str) -> Result<Option<VolumeHandle>, HypervisorError>;

    async fn create_volume(
        &self,
        xml: &str,
        flags: VolumeCreateFlags,
    ) -> Result<VolumeHandle, HypervisorError>;
}
