use crate::error::HypervisorError;
use crate::hypervisor::{Hypervisor, StoragePool};
use crate::types::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use virt::connect::Connect;
use virt::domain::Domain;
use virt::error::ErrorNumber;
use virt::storage_vol::StorageVol;

/// Hypervisor backend speaking to a libvirt daemon.
#[derive(Clone)]
pub struct LibvirtHypervisor {
    conn: Arc<Mutex<Option<Connect>>>,
}

impl LibvirtHypervisor {
    pub fn connect(uri: &str) -> Result<Self, HypervisorError> {
        tracing::info!("Connecting to hypervisor {:?}", uri);
        let conn = Connect::open(Some(uri)).map_err(|e| HypervisorError::Connect {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connect) -> Result<T, HypervisorError>,
    ) -> Result<T, HypervisorError> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(HypervisorError::Closed)?;
        f(conn)
    }
}

#[async_trait]
impl Hypervisor for LibvirtHypervisor {
    type Pool = LibvirtPool;

    async fn capabilities(&self) -> Result<String, HypervisorError> {
        self.with_conn(|conn| {
            conn.get_capabilities()
                .map_err(|e| HypervisorError::call("get capabilities", e))
        })
    }

    async fn list_storage_pools(
        &self,
        filter: PoolFilter,
    ) -> Result<Vec<LibvirtPool>, HypervisorError> {
        let flags = match filter {
            PoolFilter::All => 0,
            PoolFilter::Active => virt::sys::VIR_CONNECT_LIST_STORAGE_POOLS_ACTIVE,
            PoolFilter::Inactive => virt::sys::VIR_CONNECT_LIST_STORAGE_POOLS_INACTIVE,
        };

        self.with_conn(|conn| {
            let pools = conn
                .list_all_storage_pools(flags)
                .map_err(|e| HypervisorError::call("list storage pools", e))?;
            Ok(pools.into_iter().map(|pool| LibvirtPool { pool }).collect())
        })
    }

    async fn lookup_storage_pool(&self, name: &str) -> Result<LibvirtPool, HypervisorError> {
        self.with_conn(|conn| {
            virt::storage_pool::StoragePool::lookup_by_name(conn, name)
                .map(|pool| LibvirtPool { pool })
                .map_err(|e| match e.code() {
                    ErrorNumber::NoStoragePool => {
                        HypervisorError::NotFound(format!("storage pool {}", name))
                    }
                    _ => HypervisorError::call("lookup storage pool", e),
                })
        })
    }

    async fn create_domain(&self, xml: &str) -> Result<DomainHandle, HypervisorError> {
        self.with_conn(|conn| {
            let domain = Domain::create_xml(conn, xml, 0)
                .map_err(|e| HypervisorError::call("create domain", e))?;
            let name = domain
                .get_name()
                .map_err(|e| HypervisorError::call("get domain name", e))?;
            let uuid = domain
                .get_uuid_string()
                .map_err(|e| HypervisorError::call("get domain uuid", e))?;
            Ok(DomainHandle { name, uuid })
        })
    }

    async fn close(&self) -> Result<(), HypervisorError> {
        let conn = self.conn.lock().take();
        if let Some(mut conn) = conn {
            tracing::debug!("Closing hypervisor connection");
            conn.close()
                .map_err(|e| HypervisorError::call("close connection", e))?;
        }
        Ok(())
    }
}

pub struct LibvirtPool {
    pool: virt::storage_pool::StoragePool,
}

#[async_trait]
impl StoragePool for LibvirtPool {
    async fn name(&self) -> Result<String, HypervisorError> {
        self.pool
            .get_name()
            .map_err(|e| HypervisorError::call("get pool name", e))
    }

    async fn is_active(&self) -> Result<bool, HypervisorError> {
        self.pool
            .is_active()
            .map_err(|e| HypervisorError::call("get pool state", e))
    }

    async fn activate(&self) -> Result<(), HypervisorError> {
        self.pool
            .create(0)
            .map(|_| ())
            .map_err(|e| HypervisorError::call("activate pool", e))
    }

    async fn info(&self) -> Result<PoolInfo, HypervisorError> {
        let info = self
            .pool
            .get_info()
            .map_err(|e| HypervisorError::call("get pool info", e))?;
        Ok(PoolInfo {
            capacity: info.capacity,
            allocation: info.allocation,
            available: info.available,
        })
    }

    async fn xml_desc(&self) -> Result<String, HypervisorError> {
        self.pool
            .get_xml_desc(0)
            .map_err(|e| HypervisorError::call("get pool xml", e))
    }

    async fn lookup_volume(&self, name: &str) -> Result<Option<VolumeHandle>, HypervisorError> {
        let volume = match StorageVol::lookup_by_name(&self.pool, name) {
            Ok(volume) => volume,
            Err(e) if matches!(e.code(), ErrorNumber::NoStorageVol) => return Ok(None),
            Err(e) => return Err(HypervisorError::call("lookup volume", e)),
        };
        volume_handle(&volume).map(Some)
    }

    async fn create_volume(
        &self,
        xml: &str,
        flags: VolumeCreateFlags,
    ) -> Result<VolumeHandle, HypervisorError> {
        let mut raw = 0;
        if flags.contains(VolumeCreateFlags::PREALLOC_METADATA) {
            raw |= virt::sys::VIR_STORAGE_VOL_CREATE_PREALLOC_METADATA;
        }

        let volume = StorageVol::create_xml(&self.pool, xml, raw)
            .map_err(|e| HypervisorError::call("create volume", e))?;
        volume_handle(&volume)
    }
}

fn volume_handle(volume: &StorageVol) -> Result<VolumeHandle, HypervisorError> {
    Ok(VolumeHandle {
        name: volume
            .get_name()
            .map_err(|e| HypervisorError::call("get volume name", e))?,
        path: volume
            .get_path()
            .map_err(|e| HypervisorError::call("get volume path", e))?,
    })
}
