//! Appends files to an existing initial ramdisk.
//!
//! The files are staged into a directory, packed into a newc cpio archive,
//! gzip-compressed and appended to the ramdisk as one extra member. Linux
//! unpacks concatenated members in order, so the staged files overlay
//! whatever the original image contains.

mod copy;
mod cpio;
mod compress;
mod enumerate;
mod error;
mod pipeline;

pub use copy::{CopyOutcome, copy_file};
pub use error::{InjectError, PipelineStage};
pub use pipeline::{InjectReport, Injector};
