//! The ingestion pipeline: a scanner that claims CSV files dropped into a
//! watched directory, a splitter that cuts oversized files into chunks, and
//! a processor that drains regular-sized files into the price repository.
//!
//! Stages communicate through bounded [`FileQueue`]s and stop on a shared
//! [`StopToken`]; the [`pipeline`] module wires and supervises them.

pub mod pipeline;
pub mod processor;
pub mod scanner;
pub mod splitter;

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use foldhash::{HashMap, HashMapExt};
use log::{error, info};

pub const CSV_EXTENSION: &str = "csv";

/// A file in the watch directory. Equality is by path; the name is kept
/// separately because chunk and relocation targets are derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub path: PathBuf,
    pub name: String,
}

impl FileRef {
    pub fn new(dir: &Path, name: impl Into<String>) -> FileRef {
        let name = name.into();
        FileRef {
            path: dir.join(&name),
            name,
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("can't put file={0} into queue, queue is closed")]
    Closed(String),
    #[error("can't get file from queue, queue is closed")]
    Exhausted,
    #[error("queue is already closed")]
    AlreadyClosed,
}

/// Bounded FIFO of [`FileRef`] between two pipeline stages.
///
/// `put` blocks while the queue is full and fails only once the queue has
/// been closed; `get` blocks while it is empty and fails once the queue is
/// both closed and drained. Closing twice is reported as an error to the
/// second caller. One producer per queue instance: the sender lives behind
/// a mutex held for the duration of a blocking `put`.
pub struct FileQueue {
    tx: Mutex<Option<Sender<FileRef>>>,
    rx: Receiver<FileRef>,
}

impl FileQueue {
    pub fn new(capacity: usize) -> FileQueue {
        let (tx, rx) = bounded(capacity);
        FileQueue {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    pub fn put(&self, file: FileRef) -> Result<(), QueueError> {
        let guard = self.tx.lock().expect("file queue lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx
                .send(file)
                .map_err(|e| QueueError::Closed(e.0.to_string())),
            None => Err(QueueError::Closed(file.to_string())),
        }
    }

    pub fn get(&self) -> Result<FileRef, QueueError> {
        self.rx.recv().map_err(|_| QueueError::Exhausted)
    }

    /// A receiver handle for range-style consumption; iteration ends once
    /// the queue is closed and drained.
    pub fn data(&self) -> Receiver<FileRef> {
        self.rx.clone()
    }

    pub fn close(&self) -> Result<(), QueueError> {
        let mut guard = self.tx.lock().expect("file queue lock poisoned");
        match guard.take() {
            Some(tx) => {
                drop(tx);
                Ok(())
            },
            None => Err(QueueError::AlreadyClosed),
        }
    }

    /// Snapshot only: the answer may be stale by the time it is observed.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Paths already claimed by this scanner instance. Single-writer (the
/// scanner); entries are never evicted for the lifetime of the process.
#[derive(Default)]
pub struct FileCache {
    data: HashMap<PathBuf, FileRef>,
}

impl FileCache {
    pub fn new() -> FileCache {
        FileCache {
            data: HashMap::new(),
        }
    }

    pub fn put(&mut self, file: FileRef) {
        self.data.insert(file.path.clone(), file);
    }

    pub fn get(&self, path: &Path) -> Option<&FileRef> {
        self.data.get(path)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Cancellation pair shared by every pipeline stage. The handle side drops
/// its sender to cancel; tokens observe the disconnect. Nothing is ever
/// sent on the channel.
pub fn stop_channel() -> (StopHandle, StopToken) {
    let (tx, rx) = bounded::<()>(0);
    (
        StopHandle {
            tx: Mutex::new(Some(tx)),
        },
        StopToken { rx },
    )
}

pub struct StopHandle {
    tx: Mutex<Option<Sender<()>>>,
}

impl StopHandle {
    /// Idempotent.
    pub fn stop(&self) {
        self.tx.lock().expect("stop handle lock poisoned").take();
    }
}

#[derive(Clone)]
pub struct StopToken {
    rx: Receiver<()>,
}

impl StopToken {
    /// Block until cancellation.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    pub fn stopped(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// For `select!` arms: the receiver becomes ready (with a disconnect
    /// error) once the handle side stops.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Move a file into `dest_dir` under its own name. Failures are logged and
/// swallowed; the data path does not depend on relocation.
pub(crate) fn move_file(file: &FileRef, dest_dir: &Path) {
    let target = dest_dir.join(&file.name);
    match fs::rename(&file.path, &target) {
        Ok(()) => info!("moved file={file} to {}", target.display()),
        Err(err) => error!(
            "can't move file={file} to {}: ({err})",
            target.display()
        ),
    }
}
