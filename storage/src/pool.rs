use crate::error::StorageError;
use gegen_hypervisor::{Hypervisor, PoolFilter, StoragePool};

/// Finds the pool called `name` and makes sure it is running.
///
/// All pools are listed and matched by name, so the outcome does not depend
/// on the order the hypervisor reports them in. Only the matching pool is
/// activated.
pub async fn select_pool<H: Hypervisor + ?Sized>(
    hypervisor: &H,
    name: &str,
) -> Result<H::Pool, StorageError> {
    tracing::info!("Selecting storage pool {}", name);

    let mut named = Vec::new();
    for pool in hypervisor.list_storage_pools(PoolFilter::All).await? {
        named.push((pool.name().await?, pool));
    }
    named.sort_by(|a, b| a.0.cmp(&b.0));

    let pool = named
        .into_iter()
        .find(|(pool_name, _)| pool_name == name)
        .map(|(_, pool)| pool)
        .ok_or_else(|| StorageError::PoolNotFound(name.to_string()))?;

    if !pool.is_active().await? {
        tracing::info!("Activating storage pool {}", name);
        pool.activate().await?;
    }

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gegen_hypervisor::MemoryHypervisor;

    fn hypervisor() -> MemoryHypervisor {
        MemoryHypervisor::new("<capabilities/>")
            .with_pool("default", "/images", 100, 80, false)
            .with_pool("scratch", "/scratch", 100, 80, false)
            .with_pool("backup", "/backup", 100, 80, true)
    }

    #[tokio::test]
    async fn test_selects_and_activates_only_match() {
        let hv = hypervisor();

        let pool = select_pool(&hv, "default").await.unwrap();

        assert_eq!(pool.name().await.unwrap(), "default");
        assert!(hv.is_pool_active("default"));
        assert!(!hv.is_pool_active("scratch"));
        assert_eq!(hv.activations("scratch"), 0);
    }

    #[tokio::test]
    async fn test_active_pool_is_not_reactivated() {
        let hv = hypervisor();

        select_pool(&hv, "backup").await.unwrap();

        assert_eq!(hv.activations("backup"), 0);
    }

    #[tokio::test]
    async fn test_missing_pool() {
        let hv = hypervisor();

        let result = select_pool(&hv, "nope").await;

        assert!(matches!(result, Err(StorageError::PoolNotFound(name)) if name == "nope"));
        assert!(!hv.is_pool_active("default"));
    }
}
