use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::domain::PartialDataPolicy;

/// Destination for downloaded bytes.
///
/// Writes arrive in offset order. A retried write reuses the offset of the
/// failed attempt, so implementations must overwrite rather than append.
#[async_trait]
pub trait ByteSink: Send {
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Drop everything written so far.
    async fn truncate(&mut self) -> io::Result<()>;

    async fn finish(&mut self) -> io::Result<()>;

    async fn abandon(&mut self, policy: PartialDataPolicy) -> io::Result<()>;
}

pub struct FileSink {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl FileSink {
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).truncate(true);
        Self::open(path.as_ref(), &mut options).await
    }

    /// Like `create`, but fails with `AlreadyExists` instead of truncating.
    pub async fn create_new(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create_new(true);
        Self::open(path.as_ref(), &mut options).await
    }

    async fn open(path: &Path, options: &mut OpenOptions) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = options.write(true).open(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> io::Result<&mut tokio::fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "sink already closed"))
    }
}

#[async_trait]
impl ByteSink for FileSink {
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await
    }

    async fn truncate(&mut self) -> io::Result<()> {
        let file = self.file()?;
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    async fn abandon(&mut self, policy: PartialDataPolicy) -> io::Result<()> {
        match policy {
            PartialDataPolicy::Keep => self.finish().await,
            PartialDataPolicy::Discard => {
                self.file.take();
                debug!("removing partial file {}", self.path.display());
                match tokio::fs::remove_file(&self.path).await {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// In-memory sink; clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
    writes: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteSink for MemorySink {
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::Other, "sink already closed"));
        }
        let mut buffer = self.buffer.lock();
        let offset = offset as usize;
        if offset > buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("write at {} would leave a gap after {}", offset, buffer.len()),
            ));
        }
        buffer.truncate(offset);
        buffer.extend_from_slice(data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn truncate(&mut self) -> io::Result<()> {
        self.buffer.lock().clear();
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn abandon(&mut self, policy: PartialDataPolicy) -> io::Result<()> {
        if policy == PartialDataPolicy::Discard {
            self.buffer.lock().clear();
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
