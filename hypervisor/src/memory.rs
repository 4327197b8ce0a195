//! In-process hypervisor backend.
//!
//! Keeps pools, volumes and domains in memory and records every mutating
//! call. Used for dry runs and as the test double for the provisioning flow.

use crate::error::HypervisorError;
use crate::hypervisor::{Hypervisor, StoragePool};
use crate::types::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    capabilities: String,
    pools: BTreeMap<String, PoolState>,
    domains: Vec<String>,
    closed: bool,
    close_failure: Option<String>,
}

#[derive(Debug)]
struct PoolState {
    uuid: Uuid,
    active: bool,
    target_path: String,
    capacity: u64,
    available: u64,
    volumes: BTreeMap<String, VolumeHandle>,
    volume_xml: Vec<String>,
    activations: usize,
    lookup_failure: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHypervisor {
    state: Arc<Mutex<State>>,
}

impl MemoryHypervisor {
    pub fn new(capabilities_xml: impl Into<String>) -> Self {
        let state = State {
            capabilities: capabilities_xml.into(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A host reporting the given CPU in its capabilities document.
    pub fn with_host_cpu(arch: &str, model: &str, vendor: &str) -> Self {
        Self::new(format!(
            "<capabilities><host><uuid>{}</uuid><cpu><arch>{}</arch><model>{}</model>\
             <vendor>{}</vendor></cpu></host></capabilities>",
            Uuid::new_v4(),
            escape(arch),
            escape(model),
            escape(vendor)
        ))
    }

    pub fn with_pool(
        self,
        name: &str,
        target_path: &str,
        capacity: u64,
        available: u64,
        active: bool,
    ) -> Self {
        self.state.lock().pools.insert(
            name.to_string(),
            PoolState {
                uuid: Uuid::new_v4(),
                active,
                target_path: target_path.to_string(),
                capacity,
                available: available.min(capacity),
                volumes: BTreeMap::new(),
                volume_xml: Vec::new(),
                activations: 0,
                lookup_failure: None,
            },
        );
        self
    }

    /// Registers an already existing volume on `pool`.
    pub fn with_volume(self, pool: &str, name: &str) -> Self {
        if let Some(p) = self.state.lock().pools.get_mut(pool) {
            let path = format!("{}/{}", p.target_path.trim_end_matches('/'), name);
            p.volumes.insert(
                name.to_string(),
                VolumeHandle {
                    name: name.to_string(),
                    path,
                },
            );
        }
        self
    }

    /// Makes every volume lookup on `pool` fail with `message`.
    pub fn fail_volume_lookups(&self, pool: &str, message: &str) {
        if let Some(p) = self.state.lock().pools.get_mut(pool) {
            p.lookup_failure = Some(message.to_string());
        }
    }

    /// XML documents passed to `create_volume` on `pool`, in call order.
    pub fn created_volumes(&self, pool: &str) -> Vec<String> {
        self.state
            .lock()
            .pools
            .get(pool)
            .map(|p| p.volume_xml.clone())
            .unwrap_or_default()
    }

    pub fn activations(&self, pool: &str) -> usize {
        self.state
            .lock()
            .pools
            .get(pool)
            .map(|p| p.activations)
            .unwrap_or_default()
    }

    pub fn is_pool_active(&self, pool: &str) -> bool {
        self.state
            .lock()
            .pools
            .get(pool)
            .is_some_and(|p| p.active)
    }

    /// XML documents passed to `create_domain`, in call order.
    pub fn domains(&self) -> Vec<String> {
        self.state.lock().domains.clone()
    }

    /// Makes `close` report `message` after marking the connection closed.
    pub fn fail_close(&self, message: &str) {
        self.state.lock().close_failure = Some(message.to_string());
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn ensure_open(&self) -> Result<(), HypervisorError> {
        if self.state.lock().closed {
            return Err(HypervisorError::Closed);
        }
        Ok(())
    }

    fn pool(&self, name: &str) -> MemoryPool {
        MemoryPool {
            name: name.to_string(),
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl Hypervisor for MemoryHypervisor {
    type Pool = MemoryPool;

    async fn capabilities(&self) -> Result<String, HypervisorError> {
        self.ensure_open()?;
        Ok(self.state.lock().capabilities.clone())
    }

    async fn list_storage_pools(
        &self,
        filter: PoolFilter,
    ) -> Result<Vec<MemoryPool>, HypervisorError> {
        self.ensure_open()?;
        let names: Vec<String> = self
            .state
            .lock()
            .pools
            .iter()
            .filter(|(_, p)| filter.matches(p.active))
            .map(|(name, _)| name.clone())
            .collect();

        Ok(names.iter().map(|name| self.pool(name)).collect())
    }

    async fn lookup_storage_pool(&self, name: &str) -> Result<MemoryPool, HypervisorError> {
        self.ensure_open()?;
        if !self.state.lock().pools.contains_key(name) {
            return Err(HypervisorError::NotFound(format!("storage pool {}", name)));
        }
        Ok(self.pool(name))
    }

    async fn create_domain(&self, xml: &str) -> Result<DomainHandle, HypervisorError> {
        self.ensure_open()?;
        let name = element_text(xml, "name")
            .ok_or_else(|| HypervisorError::call("create domain", "missing <name>"))?;
        let uuid = element_text(xml, "uuid")
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut state = self.state.lock();
        if state
            .domains
            .iter()
            .any(|d| element_text(d, "name").as_deref() == Some(name.as_str()))
        {
            return Err(HypervisorError::call(
                "create domain",
                format!("domain {} already exists", name),
            ));
        }
        state.domains.push(xml.to_string());

        tracing::info!(name = %name, uuid = %uuid, "Created domain (in-memory)");
        Ok(DomainHandle { name, uuid })
    }

    async fn close(&self) -> Result<(), HypervisorError> {
        let mut state = self.state.lock();
        state.closed = true;
        match &state.close_failure {
            Some(message) => Err(HypervisorError::call("close connection", message)),
            None => Ok(()),
        }
    }
}

/// A pool handle into [`MemoryHypervisor`] state.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    name: String,
    state: Arc<Mutex<State>>,
}

impl MemoryPool {
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut PoolState) -> Result<T, HypervisorError>,
    ) -> Result<T, HypervisorError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(HypervisorError::Closed);
        }
        let pool = state
            .pools
            .get_mut(&self.name)
            .ok_or_else(|| HypervisorError::NotFound(format!("storage pool {}", self.name)))?;
        f(pool)
    }
}

#[async_trait]
impl StoragePool for MemoryPool {
    async fn name(&self) -> Result<String, HypervisorError> {
        Ok(self.name.clone())
    }

    async fn is_active(&self) -> Result<bool, HypervisorError> {
        self.with_state(|p| Ok(p.active))
    }

    async fn activate(&self) -> Result<(), HypervisorError> {
        self.with_state(|p| {
            if p.active {
                return Err(HypervisorError::call("activate pool", "pool is already active"));
            }
            p.active = true;
            p.activations += 1;
            Ok(())
        })
    }

    async fn info(&self) -> Result<PoolInfo, HypervisorError> {
        self.with_state(|p| {
            Ok(PoolInfo {
                capacity: p.capacity,
                allocation: p.capacity - p.available,
                available: p.available,
            })
        })
    }

    async fn xml_desc(&self) -> Result<String, HypervisorError> {
        let name = escape(self.name.as_str()).into_owned();
        self.with_state(|p| {
            Ok(format!(
                "<pool type=\"dir\"><name>{}</name><uuid>{}</uuid>\
                 <capacity unit=\"bytes\">{}</capacity>\
                 <allocation unit=\"bytes\">{}</allocation>\
                 <available unit=\"bytes\">{}</available>\
                 <target><path>{}</path></target></pool>",
                name,
                p.uuid,
                p.capacity,
                p.capacity - p.available,
                p.available,
                escape(p.target_path.as_str())
            ))
        })
    }

    async fn lookup_volume(&self, name: &str) -> Result<Option<VolumeHandle>, HypervisorError> {
        self.with_state(|p| {
            if let Some(message) = &p.lookup_failure {
                return Err(HypervisorError::call("lookup volume", message));
            }
            Ok(p.volumes.get(name).cloned())
        })
    }

    async fn create_volume(
        &self,
        xml: &str,
        flags: VolumeCreateFlags,
    ) -> Result<VolumeHandle, HypervisorError> {
        let name = element_text(xml, "name")
            .ok_or_else(|| HypervisorError::call("create volume", "missing <name>"))?;
        let path = element_text(xml, "path")
            .ok_or_else(|| HypervisorError::call("create volume", "missing <path>"))?;

        self.with_state(|p| {
            if p.volumes.contains_key(&name) {
                return Err(HypervisorError::call(
                    "create volume",
                    format!("volume {} already exists", name),
                ));
            }
            let handle = VolumeHandle { name, path };
            p.volumes.insert(handle.name.clone(), handle.clone());
            p.volume_xml.push(xml.to_string());
            tracing::info!(
                volume = %handle.name,
                flags = flags.bits(),
                "Created volume (in-memory)"
            );
            Ok(handle)
        })
    }
}

/// Unescaped text of the first `<tag>` element, at any depth.
fn element_text(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;
    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => inside = e.name().as_ref() == tag.as_bytes(),
            Event::Text(t) if inside => return t.unescape().ok().map(|text| text.into_owned()),
            Event::End(_) => inside = false,
            Event::Eof => return None,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hypervisor() -> MemoryHypervisor {
        MemoryHypervisor::with_host_cpu("x86_64", "Haswell", "Intel")
            .with_pool("default", "/var/lib/libvirt/images", 100, 80, false)
            .with_pool("backup", "/srv/backup", 100, 10, true)
    }

    #[tokio::test]
    async fn test_list_pools_by_filter() {
        let hv = hypervisor();

        let all = hv.list_storage_pools(PoolFilter::All).await.unwrap();
        assert_eq!(all.len(), 2);

        let inactive = hv.list_storage_pools(PoolFilter::Inactive).await.unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].name().await.unwrap(), "default");
    }

    #[tokio::test]
    async fn test_activate_pool() {
        let hv = hypervisor();
        let pool = hv.lookup_storage_pool("default").await.unwrap();

        assert!(!pool.is_active().await.unwrap());
        pool.activate().await.unwrap();
        assert!(pool.is_active().await.unwrap());
        assert!(pool.activate().await.is_err());
        assert_eq!(hv.activations("default"), 1);
    }

    #[tokio::test]
    async fn test_lookup_unknown_pool() {
        let hv = hypervisor();
        let result = hv.lookup_storage_pool("missing").await;
        assert!(matches!(result, Err(HypervisorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_volume_lifecycle() {
        let hv = hypervisor();
        let pool = hv.lookup_storage_pool("backup").await.unwrap();

        assert!(pool.lookup_volume("v1").await.unwrap().is_none());

        let xml = "<volume><name>v1</name><target><path>/srv/backup/v1</path></target></volume>";
        let handle = pool
            .create_volume(xml, VolumeCreateFlags::PREALLOC_METADATA)
            .await
            .unwrap();
        assert_eq!(handle.path, "/srv/backup/v1");

        assert_eq!(pool.lookup_volume("v1").await.unwrap(), Some(handle));
        assert!(
            pool.create_volume(xml, VolumeCreateFlags::NONE)
                .await
                .is_err()
        );
        assert_eq!(hv.created_volumes("backup").len(), 1);
    }

    #[tokio::test]
    async fn test_injected_lookup_failure() {
        let hv = hypervisor();
        hv.fail_volume_lookups("backup", "connection reset");
        let pool = hv.lookup_storage_pool("backup").await.unwrap();

        let result = pool.lookup_volume("v1").await;
        assert!(matches!(result, Err(HypervisorError::Call { .. })));
    }

    #[tokio::test]
    async fn test_xml_desc_reports_counters() {
        let hv = hypervisor();
        let pool = hv.lookup_storage_pool("default").await.unwrap();
        let xml = pool.xml_desc().await.unwrap();

        assert!(xml.contains("<name>default</name>"));
        assert!(xml.contains(r#"<available unit="bytes">80</available>"#));
        assert!(xml.contains(r#"<allocation unit="bytes">20</allocation>"#));
        assert!(xml.contains("<path>/var/lib/libvirt/images</path>"));
    }

    #[tokio::test]
    async fn test_create_domain_and_close() {
        let hv = hypervisor();
        let handle = hv
            .create_domain("<domain type=\"kvm\"><name>vm</name><uuid>abc</uuid></domain>")
            .await
            .unwrap();
        assert_eq!(handle.name, "vm");
        assert_eq!(handle.uuid, "abc");
        assert_eq!(hv.domains().len(), 1);

        let duplicate = hv
            .create_domain("<domain type=\"kvm\"><name>vm</name></domain>")
            .await;
        assert!(duplicate.is_err());

        hv.close().await.unwrap();
        assert!(hv.is_closed());
        assert!(matches!(
            hv.capabilities().await,
            Err(HypervisorError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_injected_close_failure() {
        let hv = hypervisor();
        hv.fail_close("socket closed");

        assert!(matches!(hv.close().await, Err(HypervisorError::Call { .. })));
        assert!(hv.is_closed());
    }

    #[tokio::test]
    async fn test_markup_in_names_is_escaped() {
        let hv = MemoryHypervisor::with_host_cpu("x86_64", "Haswell", "Intel")
            .with_pool("r&d", "/srv/r&d", 100, 80, true);
        let pool = hv.lookup_storage_pool("r&d").await.unwrap();

        let xml = pool.xml_desc().await.unwrap();
        assert!(xml.contains("<name>r&amp;d</name>"));
        assert!(xml.contains("<path>/srv/r&amp;d</path>"));

        let handle = pool
            .create_volume(
                "<volume><name>a&lt;b</name><target><path>/srv/r&amp;d/a&lt;b</path></target></volume>",
                VolumeCreateFlags::NONE,
            )
            .await
            .unwrap();
        assert_eq!(handle.name, "a<b");
        assert_eq!(handle.path, "/srv/r&d/a<b");
        assert!(pool.lookup_volume("a<b").await.unwrap().is_some());

        let domain = hv
            .create_domain("<domain type=\"kvm\"><name>a&amp;b</name></domain>")
            .await
            .unwrap();
        assert_eq!(domain.name, "a&b");
        assert!(
            hv.create_domain("<domain type=\"kvm\"><name>a&amp;b</name></domain>")
                .await
                .is_err()
        );
    }

    #[test]
    fn test_element_text_skips_nested_markup() {
        let xml = "<domain><devices><disk><source file=\"/x\"/></disk></devices>\
                   <uuid>u-1</uuid></domain>";
        assert_eq!(element_text(xml, "uuid").as_deref(), Some("u-1"));
        assert_eq!(element_text(xml, "name"), None);
    }

    #[test]
    fn test_flags() {
        assert!(VolumeCreateFlags::PREALLOC_METADATA.contains(VolumeCreateFlags::PREALLOC_METADATA));
        assert!(!VolumeCreateFlags::NONE.contains(VolumeCreateFlags::PREALLOC_METADATA));
    }
}
