use crate::error::{InjectError, PipelineStage};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// How [`copy_file`] placed the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Source and destination already were the same file.
    SameFile,
    Linked,
    Copied,
}

/// Places the contents of `src` at `dst`.
///
/// A hard link is tried first; when linking is not possible the data is
/// copied and flushed to disk. Both paths must name regular files (or `dst`
/// must not exist yet). An existing `dst` is unlinked and replaced, never
/// written in place.
pub async fn copy_file(src: &Path, dst: &Path) -> Result<CopyOutcome, InjectError> {
    let copy_err = |source: io::Error| InjectError::Stage {
        stage: PipelineStage::Copy,
        source,
    };

    let source = match fs::metadata(src).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(InjectError::InvalidInput(format!(
                "no such file: {}",
                src.display()
            )));
        }
        Err(e) => return Err(copy_err(e)),
    };
    if !source.is_file() {
        return Err(InjectError::InvalidInput(format!(
            "not a regular file: {}",
            src.display()
        )));
    }

    match fs::metadata(dst).await {
        Ok(dest) => {
            if !dest.is_file() {
                return Err(InjectError::InvalidInput(format!(
                    "destination is not a regular file: {}",
                    dst.display()
                )));
            }
            if dest.dev() == source.dev() && dest.ino() == source.ino() {
                return Ok(CopyOutcome::SameFile);
            }
            // dst may share its inode with a file outside staging; writing
            // through it would change that file too.
            fs::remove_file(dst).await.map_err(copy_err)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(copy_err(e)),
    }

    if fs::hard_link(src, dst).await.is_ok() {
        tracing::debug!("Linked {:?} to {:?}", src, dst);
        return Ok(CopyOutcome::Linked);
    }

    copy_contents(src, dst).await.map_err(copy_err)?;
    tracing::debug!("Copied {:?} to {:?}", src, dst);
    Ok(CopyOutcome::Copied)
}

async fn copy_contents(src: &Path, dst: &Path) -> io::Result<()> {
    let mut input = fs::File::open(src).await?;
    let mut output = fs::File::create(dst).await?;
    tokio::io::copy(&mut input, &mut output).await?;
    output.flush().await?;
    output.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_onto_itself_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        let before = std::fs::metadata(&path).unwrap();

        let outcome = copy_file(&path, &path).await.unwrap();

        assert_eq!(outcome, CopyOutcome::SameFile);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        let after = std::fs::metadata(&path).unwrap();
        assert_eq!(after.modified().unwrap(), before.modified().unwrap());
        assert_eq!(after.ino(), before.ino());
        assert_eq!(after.nlink(), 1);
    }

    #[tokio::test]
    async fn test_links_into_empty_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, "hello").unwrap();

        let outcome = copy_file(&src, &dst).await.unwrap();

        assert_eq!(outcome, CopyOutcome::Linked);
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "hello");
        assert_eq!(copy_file(&src, &dst).await.unwrap(), CopyOutcome::SameFile);
    }

    #[tokio::test]
    async fn test_overwrites_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, "hello").unwrap();
        std::fs::write(&dst, "stale contents").unwrap();

        let outcome = copy_file(&src, &dst).await.unwrap();

        assert_eq!(outcome, CopyOutcome::Linked);
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_replacing_linked_destination_keeps_old_source() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        let dst = dir.path().join("staged.txt");
        std::fs::write(&first, "user data").unwrap();
        std::fs::write(&second, "other").unwrap();

        assert_eq!(copy_file(&first, &dst).await.unwrap(), CopyOutcome::Linked);
        copy_file(&second, &dst).await.unwrap();

        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "other");
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "user data");
    }

    #[tokio::test]
    async fn test_rejects_non_regular_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        assert!(matches!(
            copy_file(&sub, &dir.path().join("x")).await,
            Err(InjectError::InvalidInput(_))
        ));
        assert!(matches!(
            copy_file(&file, &sub).await,
            Err(InjectError::InvalidInput(_))
        ));
        assert!(matches!(
            copy_file(&dir.path().join("missing"), &dir.path().join("y")).await,
            Err(InjectError::InvalidInput(_))
        ));
    }
}
