use crate::error::StorageError;
use gegen_domain::StorageVolume;
use gegen_hypervisor::{StoragePool, VolumeCreateFlags};
use std::path::Path;

/// Creates disk volumes in a pool, reusing any volume of the same name.
#[derive(Debug, Clone, Copy)]
pub struct StorageAllocator {
    flags: VolumeCreateFlags,
}

impl Default for StorageAllocator {
    fn default() -> Self {
        Self {
            flags: VolumeCreateFlags::PREALLOC_METADATA,
        }
    }
}

impl StorageAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(flags: VolumeCreateFlags) -> Self {
        Self { flags }
    }

    /// Returns the descriptor of volume `name` under `image_dir`.
    ///
    /// When the pool already holds a volume with that name no create call is
    /// made. Lookup failures other than "not found" abort the allocation.
    pub async fn allocate<P: StoragePool + ?Sized>(
        &self,
        name: &str,
        image_dir: impl AsRef<Path>,
        pool: &P,
    ) -> Result<StorageVolume, StorageError> {
        tracing::info!("Allocating volume for {}", name);
        let volume = StorageVolume::new(name, image_dir)?;

        if let Some(existing) = pool.lookup_volume(volume.name()).await? {
            tracing::info!("Volume {} already exists at {}", name, existing.path);
            return Ok(volume);
        }

        let xml = volume.to_xml()?;
        tracing::debug!("Volume descriptor: {}", xml);

        let handle = pool.create_volume(&xml, self.flags).await?;
        tracing::info!("Created volume {} at {}", handle.name, handle.path);

        Ok(volume)
    }
}
