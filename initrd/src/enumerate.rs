use std::fs::Metadata;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::Sender;
use walkdir::WalkDir;

/// One filesystem object found under the staging root.
#[derive(Debug)]
pub(crate) struct StagedEntry {
    pub path: PathBuf,
    /// Archive name: the path relative to the root, as raw bytes.
    pub name: Vec<u8>,
    pub metadata: Metadata,
}

/// Walks `root` depth-first in file-name order and sends every entry below
/// it. Symlinks are reported, not followed.
///
/// Stops early, without error, once the receiving side has gone away.
pub(crate) fn enumerate(root: &Path, entries: Sender<StagedEntry>) -> io::Result<usize> {
    let mut sent = 0;

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let name = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            .as_os_str()
            .as_bytes()
            .to_vec();
        let metadata = entry.metadata()?;

        let staged = StagedEntry {
            path: entry.into_path(),
            name,
            metadata,
        };
        if entries.blocking_send(staged).is_err() {
            tracing::debug!("Entry receiver closed, stopping enumeration");
            break;
        }
        sent += 1;
    }

    Ok(sent)
}
