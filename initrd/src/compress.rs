use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{self, Write};
use tokio::sync::mpsc::{Receiver, Sender};

const CHUNK_SIZE: usize = 64 * 1024;

/// `Write` adapter that forwards buffered chunks over a channel.
///
/// Writes fail with `BrokenPipe` once the receiver has gone away.
pub(crate) struct ChunkWriter {
    buf: Vec<u8>,
    chunks: Sender<Vec<u8>>,
}

impl ChunkWriter {
    pub fn new(chunks: Sender<Vec<u8>>) -> Self {
        Self {
            buf: Vec::with_capacity(CHUNK_SIZE),
            chunks,
        }
    }

    fn send(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.chunks
            .blocking_send(chunk)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = data.len().min(CHUNK_SIZE - self.buf.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() == CHUNK_SIZE {
            self.send()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send()
    }
}

/// Gzips every chunk received into `output` as a single member.
///
/// Returns the number of uncompressed bytes.
pub(crate) fn compress<W: Write>(mut chunks: Receiver<Vec<u8>>, output: W) -> io::Result<u64> {
    let mut encoder = GzEncoder::new(output, Compression::default());
    let mut total = 0;

    while let Some(chunk) = chunks.blocking_recv() {
        encoder.write_all(&chunk)?;
        total += chunk.len() as u64;
    }

    encoder.finish()?.flush()?;
    Ok(total)
}
