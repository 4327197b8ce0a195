use clap::Args;
use gegen_domain::{Capabilities, DomainBuilder, Feature};
use std::path::PathBuf;

#[derive(Args)]
pub struct DomainXmlArgs {
    /// Domain name
    #[arg(long)]
    name: String,

    /// Disk image path
    #[arg(long)]
    disk: String,

    /// Host capabilities document to take the CPU from
    #[arg(long)]
    capabilities: Option<PathBuf>,

    /// Network to attach the interface to
    #[arg(long)]
    network: Option<String>,

    /// Hypervisor feature to enable (acpi, apic, pae)
    #[arg(long = "feature")]
    features: Vec<Feature>,
}

pub async fn domain_xml(args: DomainXmlArgs) -> Result<(), Box<dyn std::error::Error>> {
    let capabilities = match &args.capabilities {
        Some(path) => {
            let xml = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            Capabilities::from_xml(&xml)?
        }
        None => Capabilities::default(),
    };

    let mut builder = DomainBuilder::new(args.name, args.disk, &capabilities);
    if let Some(network) = args.network {
        builder = builder.network(network, None);
    }
    for feature in args.features {
        builder = builder.feature(feature);
    }

    let domain = builder.build()?;
    println!("{}", domain.to_xml()?);
    Ok(())
}
