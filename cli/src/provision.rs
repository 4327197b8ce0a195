//! End-to-end provisioning of one domain.

use gegen_domain::{
    Capabilities, DirectBoot, DomainBuilder, DomainError, MacAddress,
    StoragePool as PoolDescriptor,
};
use gegen_hypervisor::{Hypervisor, HypervisorError, StoragePool};
use gegen_storage::{StorageAllocator, StorageError, check_pool, select_pool};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("descriptor error: {0}")]
    Domain(#[from] DomainError),

    #[error("hypervisor error: {0}")]
    Hypervisor(#[from] HypervisorError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Unsupported(String),
}

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: String,
    pub pool: String,
    pub network: Option<String>,
    pub direct_boot: Option<DirectBoot>,
}

#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub name: String,
    pub uuid: Uuid,
    pub mac: MacAddress,
    pub disk_path: String,
    pub pool: String,
    pub available: u64,
    pub xml: String,
}

#[derive(Debug, Default)]
pub struct Provisioner {
    allocator: StorageAllocator,
}

impl Provisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects and checks the pool, allocates the disk volume and starts a
    /// domain on it. The first failure aborts the run; volumes created before
    /// the failure are left in place.
    pub async fn run<H: Hypervisor>(
        &self,
        hypervisor: &H,
        request: &ProvisionRequest,
    ) -> Result<ProvisionReport, ProvisionError> {
        tracing::info!("Provisioning domain {}", request.name);

        let capabilities = Capabilities::from_xml(&hypervisor.capabilities().await?)?;

        let pool = select_pool(hypervisor, &request.pool).await?;
        check_pool(&pool).await?;
        let available = pool.info().await?.available;

        let descriptor = PoolDescriptor::from_xml(&pool.xml_desc().await?)?;
        let volume = self
            .allocator
            .allocate(&request.name, descriptor.target_path(), &pool)
            .await?;

        let mut builder = DomainBuilder::new(&request.name, volume.path(), &capabilities);
        if let Some(network) = &request.network {
            builder = builder.network(network, None);
        }
        if let Some(boot) = &request.direct_boot {
            builder = builder.direct_boot(boot.clone());
        }
        let domain = builder.build()?;

        let xml = domain.to_xml()?;
        tracing::debug!("Domain descriptor: {}", xml);

        let handle = hypervisor.create_domain(&xml).await?;
        tracing::info!("Started domain {} ({})", handle.name, handle.uuid);

        let mac = domain
            .devices
            .interface
            .first()
            .map(|nic| nic.mac.address)
            .ok_or_else(|| DomainError::InvalidInput("domain has no interface".to_string()))?;

        Ok(ProvisionReport {
            name: domain.name.clone(),
            uuid: domain.uuid(),
            mac,
            disk_path: volume.path().to_string(),
            pool: request.pool.clone(),
            available,
            xml,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gegen_core::size::GIB;
    use gegen_domain::Domain;
    use gegen_hypervisor::MemoryHypervisor;

    fn hypervisor(available: u64) -> MemoryHypervisor {
        MemoryHypervisor::with_host_cpu("x86_64", "Skylake-Client", "Intel")
            .with_pool("default", "/var/lib/libvirt/images", 500 * GIB, available, false)
            .with_pool("other", "/srv/other", 500 * GIB, 400 * GIB, false)
    }

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            name: "engine".to_string(),
            pool: "default".to_string(),
            network: None,
            direct_boot: None,
        }
    }

    #[tokio::test]
    async fn test_provision() {
        let hv = hypervisor(200 * GIB);

        let report = Provisioner::new().run(&hv, &request()).await.unwrap();

        assert_eq!(report.name, "engine");
        assert_eq!(report.disk_path, "/var/lib/libvirt/images/engine");
        assert_eq!(report.available, 200 * GIB);
        assert!(report.mac.is_local_unicast());
        assert!(hv.is_pool_active("default"));
        assert!(!hv.is_pool_active("other"));
        assert_eq!(hv.created_volumes("default").len(), 1);

        let domains = hv.domains();
        assert_eq!(domains, [report.xml.clone()]);

        let domain = Domain::from_xml(&report.xml).unwrap();
        assert_eq!(domain.uuid(), report.uuid);
        assert_eq!(domain.cpu.model.unwrap().name, "Skylake-Client");
        assert_eq!(domain.cpu.vendor.as_deref(), Some("Intel"));
        assert_eq!(
            domain.devices.disk[0].source.file,
            "/var/lib/libvirt/images/engine"
        );
    }

    #[tokio::test]
    async fn test_insufficient_space_creates_nothing() {
        let hv = hypervisor(49 * GIB);

        let result = Provisioner::new().run(&hv, &request()).await;

        assert!(matches!(
            result,
            Err(ProvisionError::Storage(StorageError::InsufficientStorage { .. }))
        ));
        assert!(hv.created_volumes("default").is_empty());
        assert!(hv.domains().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pool() {
        let hv = hypervisor(200 * GIB);
        let mut request = request();
        request.pool = "missing".to_string();

        let result = Provisioner::new().run(&hv, &request).await;

        assert!(matches!(
            result,
            Err(ProvisionError::Storage(StorageError::PoolNotFound(_)))
        ));
        assert!(!hv.is_pool_active("default"));
    }

    #[tokio::test]
    async fn test_direct_boot_and_network() {
        let hv = hypervisor(200 * GIB);
        let mut request = request();
        request.network = Some("isolated".to_string());
        request.direct_boot = Some(DirectBoot {
            kernel: "/boot/vmlinuz".to_string(),
            initrd: Some("/boot/initrd.img".to_string()),
            cmdline: Some("console=ttyS0".to_string()),
            init: None,
        });

        let report = Provisioner::new().run(&hv, &request).await.unwrap();

        let domain = Domain::from_xml(&report.xml).unwrap();
        assert_eq!(domain.os.kernel.as_deref(), Some("/boot/vmlinuz"));
        assert_eq!(domain.os.cmdline.as_deref(), Some("console=ttyS0"));
        let nic = &domain.devices.interface[0];
        assert_eq!(nic.source.network, "isolated");
        assert_eq!(nic.source.bridge, None);
    }

    #[tokio::test]
    async fn test_second_run_reuses_volume() {
        let hv = hypervisor(200 * GIB);
        let provisioner = Provisioner::new();

        provisioner.run(&hv, &request()).await.unwrap();
        // The domain name is taken, so the second run fails at creation,
        // after reusing the existing volume.
        let second = provisioner.run(&hv, &request()).await;

        assert!(matches!(second, Err(ProvisionError::Hypervisor(_))));
        assert_eq!(hv.created_volumes("default").len(), 1);
    }
}
