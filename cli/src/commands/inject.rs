use clap::Args;
use gegen_core::size::format_size;
use gegen_initrd::Injector;
use std::path::PathBuf;

#[derive(Args)]
pub struct InjectArgs {
    /// Ramdisk to extend
    #[arg(long)]
    initrd: PathBuf,

    /// Directory the files are staged in before packing
    #[arg(long)]
    staging_dir: PathBuf,

    /// Files to add
    files: Vec<PathBuf>,
}

pub async fn inject(args: InjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let injector = Injector::new(args.staging_dir);
    let report = injector.inject(&args.initrd, &args.files).await?;

    println!(
        "Appended {} entries to {} ({} -> {})",
        report.entries,
        args.initrd.display(),
        format_size(report.original_size),
        format_size(report.original_size + report.appended_size)
    );
    Ok(())
}
