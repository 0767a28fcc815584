#![forbid(unsafe_code)]

//! Ordered writer for the module translation unit. Variants may finish
//! rendering in any order; a single task owns the file and appends chunks
//! strictly by index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{OutputError, ResourceContentionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Attempt `n` (from 1) waits `n * base` before the next try.
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_millis(50),
        }
    }
}

/// Creates (or truncates) `path`, retrying with linear backoff.
pub async fn open_with_retry(
    path: &Path,
    policy: RetryPolicy,
) -> Result<File, ResourceContentionError> {
    let attempts = policy.attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
        {
            Ok(file) => return Ok(file),
            Err(e) => {
                warn!(path = %path.display(), attempt, error = %e, "could not open output file");
                last = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.base * attempt).await;
                }
            }
        }
    }
    Err(ResourceContentionError {
        path: path.to_path_buf(),
        attempts,
        source: last.unwrap_or_else(|| std::io::Error::other("no attempt was made")),
    })
}

pub struct OutputQueue {
    path: PathBuf,
    tx: mpsc::Sender<(usize, String)>,
    writer: JoinHandle<std::io::Result<u64>>,
}

impl OutputQueue {
    /// Opens `path` and starts the writer task. Must be called inside a
    /// tokio runtime.
    pub async fn open(path: &Path, policy: RetryPolicy) -> Result<Self, OutputError> {
        let file = open_with_retry(path, policy).await?;
        let (tx, rx) = mpsc::channel(16);
        let writer = tokio::spawn(write_in_order(file, rx));
        Ok(Self {
            path: path.to_path_buf(),
            tx,
            writer,
        })
    }

    /// Queues chunk `index`. Indices start at 0 and must not repeat.
    pub async fn submit(&self, index: usize, text: String) -> Result<(), OutputError> {
        self.tx
            .send((index, text))
            .await
            .map_err(|_| OutputError::Closed)
    }

    /// Closes the queue and waits for the writer. Returns bytes written.
    pub async fn finish(self) -> Result<u64, OutputError> {
        let Self { path, tx, writer } = self;
        drop(tx);
        match writer.await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(source)) => Err(OutputError::Io { path, source }),
            Err(_) => Err(OutputError::Closed),
        }
    }
}

async fn write_in_order(
    mut file: File,
    mut rx: mpsc::Receiver<(usize, String)>,
) -> std::io::Result<u64> {
    let mut pending = BTreeMap::new();
    let mut next = 0usize;
    let mut written = 0u64;
    while let Some((index, chunk)) = rx.recv().await {
        pending.insert(index, chunk);
        while let Some(chunk) = pending.remove(&next) {
            file.write_all(chunk.as_bytes()).await?;
            written += chunk.len() as u64;
            next += 1;
        }
    }
    // Indices past a gap are still written, in order.
    for (index, chunk) in pending {
        debug!(index, expected = next, "writing chunk after a gap");
        file.write_all(chunk.as_bytes()).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Writes `parts` to `path` through an [`OutputQueue`] on a private
/// runtime.
pub fn write_ordered_blocking(
    path: &Path,
    parts: &[String],
    policy: RetryPolicy,
) -> Result<u64, OutputError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    runtime.block_on(async {
        let queue = OutputQueue::open(path, policy).await?;
        let submit = async {
            for (index, part) in parts.iter().enumerate() {
                queue.submit(index, part.clone()).await?;
            }
            Ok::<_, OutputError>(())
        };
        submit.await?;
        queue.finish().await
    })
}
