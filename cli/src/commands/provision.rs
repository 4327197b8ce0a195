use crate::provision::{ProvisionError, ProvisionReport, ProvisionRequest, Provisioner};
use clap::Args;
use gegen_core::EngineConfig;
use gegen_core::size::{GIB, format_size};
use gegen_domain::DirectBoot;
use gegen_hypervisor::{Hypervisor, MemoryHypervisor};

const DRY_RUN_IMAGE_DIR: &str = "/var/lib/libvirt/images";

#[derive(Args)]
pub struct ProvisionArgs {
    /// Domain and volume name
    #[arg(long)]
    name: String,

    /// Storage pool (defaults to the configured pool)
    #[arg(long)]
    pool: Option<String>,

    /// Hypervisor URI (defaults to the configured URI)
    #[arg(long)]
    uri: Option<String>,

    /// Network to attach the interface to
    #[arg(long)]
    network: Option<String>,

    /// Run against an in-memory hypervisor and print the descriptor
    #[arg(long)]
    dry_run: bool,

    /// Kernel image for direct boot
    #[arg(long)]
    kernel: Option<String>,

    /// Initial ramdisk for direct boot
    #[arg(long, requires = "kernel")]
    initrd: Option<String>,

    /// Kernel command line for direct boot
    #[arg(long, requires = "kernel")]
    cmdline: Option<String>,
}

pub async fn provision(
    config: &EngineConfig,
    args: ProvisionArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = ProvisionRequest {
        name: args.name,
        pool: args
            .pool
            .unwrap_or_else(|| config.storage_pool_name().to_string()),
        network: args.network,
        direct_boot: args.kernel.map(|kernel| DirectBoot {
            kernel,
            initrd: args.initrd,
            cmdline: args.cmdline,
            init: None,
        }),
    };
    let uri = args
        .uri
        .unwrap_or_else(|| config.hypervisor_uri().to_string());

    if args.dry_run {
        tracing::info!("Dry run, not connecting to {}", uri);
        let hypervisor = MemoryHypervisor::with_host_cpu("x86_64", "qemu64", "unknown").with_pool(
            &request.pool,
            DRY_RUN_IMAGE_DIR,
            100 * GIB,
            100 * GIB,
            false,
        );
        let report = run(&hypervisor, &request).await?;
        println!("{}", report.xml);
        return Ok(());
    }

    let report = connect_and_run(&uri, &request).await?;
    print_report(&report);
    Ok(())
}

#[cfg(feature = "libvirt")]
async fn connect_and_run(
    uri: &str,
    request: &ProvisionRequest,
) -> Result<ProvisionReport, ProvisionError> {
    let hypervisor = gegen_hypervisor::LibvirtHypervisor::connect(uri)?;
    run(&hypervisor, request).await
}

#[cfg(not(feature = "libvirt"))]
async fn connect_and_run(
    uri: &str,
    _request: &ProvisionRequest,
) -> Result<ProvisionReport, ProvisionError> {
    Err(ProvisionError::Unsupported(format!(
        "cannot connect to {}: built without the libvirt feature (use --dry-run)",
        uri
    )))
}

/// Runs the provisioner and closes the connection whatever the outcome.
/// A provisioning error wins over a close error.
async fn run<H: Hypervisor>(
    hypervisor: &H,
    request: &ProvisionRequest,
) -> Result<ProvisionReport, ProvisionError> {
    let result = Provisioner::new().run(hypervisor, request).await;
    match (result, hypervisor.close().await) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close)) => {
            tracing::warn!("Failed to close hypervisor connection: {}", close);
            Err(e)
        }
    }
}

fn print_report(report: &ProvisionReport) {
    println!("Domain provisioned:");
    println!("  Name:      {}", report.name);
    println!("  UUID:      {}", report.uuid);
    println!("  MAC:       {}", report.mac);
    println!("  Disk:      {}", report.disk_path);
    println!(
        "  Pool:      {} ({} available)",
        report.pool,
        format_size(report.available)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use gegen_hypervisor::HypervisorError;
    use gegen_storage::StorageError;

    fn hypervisor() -> MemoryHypervisor {
        MemoryHypervisor::with_host_cpu("x86_64", "Skylake-Client", "Intel").with_pool(
            "default",
            DRY_RUN_IMAGE_DIR,
            200 * GIB,
            200 * GIB,
            true,
        )
    }

    fn request(pool: &str) -> ProvisionRequest {
        ProvisionRequest {
            name: "engine".to_string(),
            pool: pool.to_string(),
            network: None,
            direct_boot: None,
        }
    }

    #[tokio::test]
    async fn test_run_closes_connection() {
        let hv = hypervisor();

        run(&hv, &request("default")).await.unwrap();

        assert!(hv.is_closed());
    }

    #[tokio::test]
    async fn test_close_failure_keeps_provisioning_error() {
        let hv = hypervisor();
        hv.fail_close("socket closed");

        let result = run(&hv, &request("missing")).await;

        assert!(matches!(
            result,
            Err(ProvisionError::Storage(StorageError::PoolNotFound(_)))
        ));
        assert!(hv.is_closed());
    }

    #[tokio::test]
    async fn test_close_failure_after_success_is_reported() {
        let hv = hypervisor();
        hv.fail_close("socket closed");

        let result = run(&hv, &request("default")).await;

        assert!(matches!(
            result,
            Err(ProvisionError::Hypervisor(HypervisorError::Call { .. }))
        ));
        assert_eq!(hv.domains().len(), 1);
    }
}
