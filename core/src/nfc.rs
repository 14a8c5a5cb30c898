//! The NFC capability: scanning tags and writing messages to them.
//!
//! Backends implement [`Reader`] and [`Writer`]. Scanning yields a [`Scan`], an endless iterator
//! of [`ScanEvent`]s that stops only when cancelled through its [`CancelHandle`].

pub use apdu::core::{HandleError, HandlerInCtx};
pub use apdu::Handler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::record::TagMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("NFC is not available: {0}")]
    Unavailable(String),

    #[error("Another write is still in progress")]
    WriteInProgress,

    #[error("{0}")]
    Platform(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A notification from an ongoing scan
#[derive(Debug)]
pub enum ScanEvent {
    /// A tag was presented and read.
    Reading(TagMessage),

    /// Reading a tag failed; scanning continues.
    Error(String),
}

/// A source of tag messages polled by a [`Scan`].
pub trait Poller {
    /// Checks the reader once.
    /// Returns `Ok(None)` while no new tag is presented.
    fn poll(&mut self) -> Result<Option<TagMessage>>;
}

/// Starts listening for tags.
pub trait Reader {
    type Poller: Poller;

    /// Starts a scan, returning once the reader is listening.
    /// Scanning again starts another, independent subscription.
    fn scan(&self) -> Result<Scan<Self::Poller>>;
}

/// Writes a message to the next tag presented.
pub trait Writer {
    /// Blocks until a tag is presented and written, or writing failed.
    fn write(&self, message: &TagMessage) -> Result<()>;
}

/// Cancels a scan, possibly from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// An ongoing subscription to tags.
/// Iterating blocks until the next event; iteration ends only after cancellation.
pub struct Scan<P> {
    poller: P,
    interval: Duration,
    cancel: CancelHandle,
    failed: bool,
}

impl<P: Poller> Scan<P> {
    /// Creates a scan polling the poller for each interval.
    pub fn new(poller: P, interval: Duration) -> Self {
        Self {
            poller,
            interval,
            cancel: CancelHandle::default(),
            failed: false,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel()
    }
}

impl<P: Poller> Iterator for Scan<P> {
    type Item = ScanEvent;

    fn next(&mut self) -> Option<Self::Item> {
        // Backs off after an error, not to report a broken reader in a busy loop.
        if std::mem::take(&mut self.failed) {
            sleep(self.interval);
        }

        while !self.cancel.is_cancelled() {
            match self.poller.poll() {
                Ok(Some(message)) => return Some(ScanEvent::Reading(message)),
                Ok(None) => sleep(self.interval),
                Err(e) => {
                    debug!("Scan error: {}", e);

                    self.failed = true;
                    return Some(ScanEvent::Error(e.to_string()));
                }
            }
        }

        None
    }
}

/// A writer refusing to start a write while another one is pending.
pub struct ExclusiveWriter<W> {
    inner: W,
    pending: AtomicBool,
}

impl<W: Writer> ExclusiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: AtomicBool::new(false),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<W: Writer> Writer for ExclusiveWriter<W> {
    fn write(&self, message: &TagMessage) -> Result<()> {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::WriteInProgress);
        }

        let _guard = PendingGuard(&self.pending);
        self.inner.write(message)
    }
}
