//! Free-space gate run before anything is allocated.
//!
//! The check is advisory: nothing is reserved, so a concurrent writer may
//! still fill the pool afterwards.

use crate::error::StorageError;
use gegen_core::size::{GIB, format_size};
use gegen_hypervisor::StoragePool;

/// Minimum free space a pool must report.
pub const REQUIRED_AVAILABLE: u64 = 50 * GIB;

pub fn check_capacity(available: u64) -> Result<(), StorageError> {
    if available < REQUIRED_AVAILABLE {
        return Err(StorageError::InsufficientStorage {
            required: REQUIRED_AVAILABLE,
            available,
        });
    }
    Ok(())
}

/// Reads the pool counters and applies [`check_capacity`].
pub async fn check_pool<P: StoragePool + ?Sized>(pool: &P) -> Result<(), StorageError> {
    let info = pool.info().await?;
    tracing::debug!(
        "Pool has {} available of {}",
        format_size(info.available),
        format_size(info.capacity)
    );
    check_capacity(info.available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gegen_hypervisor::{Hypervisor, MemoryHypervisor};
    use proptest::prelude::*;

    #[test]
    fn test_threshold_boundaries() {
        assert!(matches!(
            check_capacity(49 * GIB),
            Err(StorageError::InsufficientStorage {
                required: REQUIRED_AVAILABLE,
                available,
            }) if available == 49 * GIB
        ));
        assert!(check_capacity(50 * GIB).is_ok());
        assert!(check_capacity(51 * GIB).is_ok());
        assert!(check_capacity(REQUIRED_AVAILABLE - 1).is_err());
    }

    proptest! {
        #[test]
        fn prop_threshold(available in any::<u64>()) {
            prop_assert_eq!(check_capacity(available).is_ok(), available >= 50 * GIB);
        }
    }

    #[tokio::test]
    async fn test_check_pool() {
        let hv = MemoryHypervisor::new("<capabilities/>")
            .with_pool("small", "/small", 100 * GIB, 20 * GIB, true)
            .with_pool("large", "/large", 200 * GIB, 120 * GIB, true);

        let small = hv.lookup_storage_pool("small").await.unwrap();
        let large = hv.lookup_storage_pool("large").await.unwrap();

        assert!(matches!(
            check_pool(&small).await,
            Err(StorageError::InsufficientStorage { .. })
        ));
        assert!(check_pool(&large).await.is_ok());
    }
}
