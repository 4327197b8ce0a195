use crate::compress::{ChunkWriter, compress};
use crate::copy::copy_file;
use crate::cpio::CpioWriter;
use crate::enumerate::{StagedEntry, enumerate};
use crate::error::{InjectError, PipelineStage};
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

const ENTRY_QUEUE: usize = 64;
const CHUNK_QUEUE: usize = 16;
const APPEND_BUF_SIZE: usize = 64 * 1024;

/// Result of a successful injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectReport {
    /// Entries written to the appended archive.
    pub entries: usize,
    /// Ramdisk length before the append.
    pub original_size: u64,
    /// Length of the appended gzip member.
    pub appended_size: u64,
}

/// Appends the contents of a staging directory to ramdisk images.
///
/// Runs are serialized: a second `inject` on the same injector waits for
/// the first one to finish.
pub struct Injector {
    staging_dir: PathBuf,
    lock: Mutex<()>,
}

impl Injector {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Stages `files` and appends everything in the staging directory to
    /// `initrd` as a new compressed archive member.
    ///
    /// The ramdisk is only written once the member has been fully built.
    /// If writing fails part way, the ramdisk is cut back to its previous
    /// length.
    pub async fn inject(
        &self,
        initrd: &Path,
        files: &[PathBuf],
    ) -> Result<InjectReport, InjectError> {
        let _guard = self.lock.lock().await;

        self.check_inputs(initrd).await?;

        tracing::info!(
            "Injecting {} files into {:?} via {:?}",
            files.len(),
            initrd,
            self.staging_dir
        );
        for file in files {
            let base = file.file_name().ok_or_else(|| {
                InjectError::InvalidInput(format!("no file name in {}", file.display()))
            })?;
            copy_file(file, &self.staging_dir.join(base)).await?;
        }

        let member = self.build_member(initrd).await?;
        let (original_size, appended_size) = append_member(initrd, &member.file)
            .await
            .map_err(InjectError::stage(PipelineStage::Append))?;

        tracing::info!(
            "Appended {} entries ({} bytes) to {:?}",
            member.entries,
            appended_size,
            initrd
        );

        Ok(InjectReport {
            entries: member.entries,
            original_size,
            appended_size,
        })
    }

    async fn check_inputs(&self, initrd: &Path) -> Result<(), InjectError> {
        match fs::metadata(initrd).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                return Err(InjectError::InvalidInput(format!(
                    "ramdisk is not a regular file: {}",
                    initrd.display()
                )));
            }
            Err(e) => {
                return Err(InjectError::InvalidInput(format!(
                    "ramdisk {}: {}",
                    initrd.display(),
                    e
                )));
            }
        }

        if !fs::metadata(&self.staging_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(InjectError::InvalidInput(format!(
                "staging directory does not exist: {}",
                self.staging_dir.display()
            )));
        }

        Ok(())
    }

    /// Runs enumerate, pack and compress concurrently into a temporary file
    /// next to `initrd`.
    async fn build_member(&self, initrd: &Path) -> Result<Member, InjectError> {
        let dir = match initrd.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".initrd-member")
            .tempfile_in(dir)
            .map_err(InjectError::stage(PipelineStage::Compress))?;
        let output = temp
            .as_file()
            .try_clone()
            .map_err(InjectError::stage(PipelineStage::Compress))?;

        let (entry_tx, entry_rx) = mpsc::channel::<StagedEntry>(ENTRY_QUEUE);
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(CHUNK_QUEUE);

        let compressor = tokio::task::spawn_blocking(move || compress(chunk_rx, output));
        let packer = tokio::task::spawn_blocking(move || pack(entry_rx, chunk_tx));
        let root = self.staging_dir.clone();
        let walker = tokio::task::spawn_blocking(move || enumerate(&root, entry_tx));

        let walked = join(PipelineStage::Enumerate, walker).await;
        let packed = join(PipelineStage::Pack, packer).await;
        let compressed = join(PipelineStage::Compress, compressor).await;

        walked?;
        let entries = packed?;
        let raw = compressed?;
        tracing::debug!("Archive of {} entries is {} bytes uncompressed", entries, raw);

        Ok(Member {
            file: temp,
            entries,
        })
    }
}

struct Member {
    file: NamedTempFile,
    entries: usize,
}

async fn join<T>(
    stage: PipelineStage,
    handle: JoinHandle<io::Result<T>>,
) -> Result<T, InjectError> {
    match handle.await {
        Ok(result) => result.map_err(InjectError::stage(stage)),
        Err(e) => Err(InjectError::Stage {
            stage,
            source: io::Error::other(e),
        }),
    }
}

/// Packs every received entry into a newc archive and streams it out in
/// chunks. Directories, regular files and symlinks are archived; anything
/// else is skipped.
fn pack(
    mut entries: mpsc::Receiver<StagedEntry>,
    chunks: mpsc::Sender<Vec<u8>>,
) -> io::Result<usize> {
    match write_archive(&mut entries, ChunkWriter::new(chunks)) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("Chunk receiver closed, stopping pack");
            Ok(0)
        }
        other => other,
    }
}

fn write_archive(
    entries: &mut mpsc::Receiver<StagedEntry>,
    out: ChunkWriter,
) -> io::Result<usize> {
    let mut archive = CpioWriter::new(out);
    let mut packed = 0;

    while let Some(entry) = entries.blocking_recv() {
        let file_type = entry.metadata.file_type();
        if file_type.is_dir() {
            archive.append_directory(&entry.name, &entry.metadata)?;
        } else if file_type.is_file() {
            let mut file = File::open(&entry.path)?;
            archive.append_file(&entry.name, &entry.metadata, &mut file)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(&entry.path)?;
            archive.append_symlink(&entry.name, &entry.metadata, target.as_os_str().as_bytes())?;
        } else {
            tracing::warn!("Skipping unsupported file type at {:?}", entry.path);
            continue;
        }
        tracing::debug!("Packed {:?}", entry.path);
        packed += 1;
    }

    archive.finish()?.flush()?;
    Ok(packed)
}

/// Appends the finished member file to `target`.
async fn append_member(target: &Path, member: &NamedTempFile) -> io::Result<(u64, u64)> {
    let mut input = fs::File::from_std(member.reopen()?);
    append_from(target, &mut input).await
}

/// Appends everything `input` yields to `target` and returns the original
/// length and the number of bytes appended. If reading or writing fails
/// part way, `target` is truncated back to its original length.
async fn append_from<R: AsyncRead + Unpin>(
    target: &Path,
    input: &mut R,
) -> io::Result<(u64, u64)> {
    let mut output = fs::OpenOptions::new().append(true).open(target).await?;
    let original = output.metadata().await?.len();

    let result = async {
        let mut buf = vec![0u8; APPEND_BUF_SIZE];
        let mut copied = 0;
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            output.write_all(&buf[..n]).await?;
            copied += n as u64;
        }
        output.flush().await?;
        output.sync_all().await?;
        Ok::<_, io::Error>(copied)
    }
    .await;

    match result {
        Ok(copied) => Ok((original, copied)),
        Err(e) => {
            tracing::warn!("Append to {:?} failed, restoring {} bytes", target, original);
            output.set_len(original).await?;
            output.sync_all().await?;
            Err(e)
        }
    }
}
