//! Scoped ownership of pipeline resources.
//!
//! Every collaborator that holds native state (decoder, encoder, recorder,
//! capture surface, transcoder scratch files) implements [`Closeable`] and is
//! wrapped in a [`Closing`] guard for the duration of a job. The guard closes
//! on every exit path, including early returns through `?` and panics.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cutroom_common::error::CutroomResult;

/// Something that must be released exactly once.
pub trait Closeable {
    /// Release underlying resources. Must tolerate being called twice.
    fn close(&mut self);
}

impl<T: Closeable + ?Sized> Closeable for Box<T> {
    fn close(&mut self) {
        (**self).close();
    }
}

/// Counts open handles so tests and the runner can assert nothing leaked.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    open: Arc<AtomicUsize>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one open handle. It is released when the returned guard drops.
    pub fn acquire(&self, label: &'static str) -> ResourceHandle {
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(resource = label, open, "Resource acquired");
        ResourceHandle {
            label,
            open: Arc::clone(&self.open),
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Registration token for one tracked resource.
#[derive(Debug)]
pub struct ResourceHandle {
    label: &'static str,
    open: Arc<AtomicUsize>,
}

impl ResourceHandle {
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        let open = self.open.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::trace!(resource = self.label, open, "Resource released");
    }
}

/// Guard that closes its resource once, on [`Closing::close`] or drop.
pub struct Closing<T: Closeable + ?Sized> {
    closed: bool,
    inner: Box<T>,
}

impl<T: Closeable + ?Sized> Closing<T> {
    pub fn new(inner: Box<T>) -> Self {
        Self {
            closed: false,
            inner,
        }
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<T: Closeable + ?Sized> Deref for Closing<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Closeable + ?Sized> DerefMut for Closing<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Closeable + ?Sized> Drop for Closing<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Private working directory, removed when its owner is dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create `<root>/<name>`.
    pub fn create(root: &Path, name: &str) -> CutroomResult<Self> {
        let path = root.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Closeable for ScratchDir {
    fn close(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scratch dir");
            }
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.close();
    }
}
