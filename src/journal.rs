//! Append-only on-disk journal with an async background writer (C3), per
//! `SPEC_FULL.md` §4.3.
//!
//! Writes never happen on the request path: callers hand a message to an
//! unbounded channel and a single background task is the sole writer, so
//! file access is never shared across threads. `Clear` travels on the same
//! channel as `Append`, which is what makes "drain pending appends, then
//! clear" a structural guarantee rather than a second lock to get right.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use crate::domain::{Completion, Fingerprint, JournalRecordWire};
use crate::error::AppError;

enum Message {
    Append(Fingerprint, Completion),
    Clear,
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the journal's background writer.
///
/// Cloning shares the same channel and pending-write counter; dropping the
/// last handle closes the channel and lets the worker task exit once its
/// queue drains.
#[derive(Clone)]
pub struct Journal {
    tx: mpsc::UnboundedSender<Message>,
    pending: Arc<AtomicU64>,
}

impl Journal {
    /// Opens (creating if absent) the journal file at `path`, replays any
    /// existing records into `on_load`, and spawns the background writer.
    ///
    /// Malformed lines are logged and skipped rather than failing startup —
    /// a half-written line from a prior crash shouldn't take down the
    /// process.
    pub async fn open(
        path: impl AsRef<Path>,
        mut on_load: impl FnMut(Fingerprint, Completion),
    ) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::CacheIoFatal {
                    message: format!("creating {}: {e}", parent.display()),
                })?;
        }

        match fs::read_to_string(&path).await {
            Ok(contents) => {
                for (lineno, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JournalRecordWire>(line) {
                        Ok(record) => match record.key.parse::<Fingerprint>() {
                            Ok(fp) => on_load(fp, record.value),
                            Err(e) => {
                                tracing::warn!(line = lineno, error = %e, "skipping journal line with invalid key");
                            }
                        },
                        Err(e) => {
                            tracing::warn!(line = lineno, error = %e, "skipping malformed journal line");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AppError::CacheIoFatal {
                    message: format!("reading {}: {e}", path.display()),
                })
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicU64::new(0));
        tokio::spawn(run_writer(path, rx, Arc::clone(&pending)));

        Ok(Self { tx, pending })
    }

    /// Queues a completion for durable append. Fire-and-forget: failures are
    /// logged by the writer task as `CacheIoTransient`, never surfaced here,
    /// per §7 — the in-memory store stays authoritative regardless.
    pub fn append(&self, fp: Fingerprint, completion: Completion) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(Message::Append(fp, completion));
    }

    /// Queues a clear. Because this travels on the same channel as pending
    /// appends, every append queued before this call is durably written
    /// before the file is truncated.
    pub fn clear(&self) {
        let _ = self.tx.send(Message::Clear);
    }

    /// Number of appends queued but not yet written to disk.
    pub fn pending_writes(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Drains the writer's queue and waits for it to finish, for graceful
    /// shutdown.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_writer(
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<Message>,
    pending: Arc<AtomicU64>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Append(fp, completion) => {
                match append_line(&path, fp, &completion).await {
                    Ok(()) => {
                        pending.fetch_sub(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "journal append failed");
                    }
                }
            }
            Message::Clear => {
                if let Err(e) = clear_file(&path).await {
                    tracing::warn!(error = %e, "journal clear failed");
                }
            }
            Message::Shutdown(ack) => {
                let _ = ack.send(());
                break;
            }
        }
    }
}

async fn append_line(path: &Path, fp: Fingerprint, completion: &Completion) -> Result<(), AppError> {
    let record = JournalRecordWire {
        key: fp.to_hex(),
        value: completion.clone(),
    };
    let mut line = serde_json::to_string(&record).map_err(|e| AppError::CacheIoTransient {
        message: format!("serializing journal record: {e}"),
    })?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| AppError::CacheIoTransient {
            message: format!("opening {}: {e}", path.display()),
        })?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|e| AppError::CacheIoTransient {
            message: format!("writing {}: {e}", path.display()),
        })
}

/// Truncates the journal via temp-file-then-rename so a crash mid-clear
/// never leaves a half-written file — readers only ever see the old file
/// or the new (empty) one.
async fn clear_file(path: &Path) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, b"")
        .await
        .map_err(|e| AppError::CacheIoTransient {
            message: format!("writing {}: {e}", tmp.display()),
        })?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::CacheIoTransient {
            message: format!("renaming {} to {}: {e}", tmp.display(), path.display()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn append_then_reopen_replays_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.jsonl");

        let journal = Journal::open(&path, |_, _| {}).await.unwrap();
        journal.append(fp(1), Completion(json!({"text": "a"})));
        journal.append(fp(2), Completion(json!({"text": "b"})));
        journal.shutdown().await;

        let mut loaded = Vec::new();
        let _ = Journal::open(&path, |fp, c| loaded.push((fp, c))).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].1.text(), "a");
        assert_eq!(loaded[1].1.text(), "b");
    }

    #[tokio::test]
    async fn missing_file_loads_nothing_and_does_not_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("journal.jsonl");
        let mut loaded = Vec::new();
        Journal::open(&path, |fp, c| loaded.push((fp, c))).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.jsonl");
        let good = JournalRecordWire {
            key: fp(3).to_hex(),
            value: Completion(json!({"text": "ok"})),
        };
        let contents = format!("not json at all\n{}\n", serde_json::to_string(&good).unwrap());
        fs::write(&path, contents).await.unwrap();

        let mut loaded = Vec::new();
        Journal::open(&path, |fp, c| loaded.push((fp, c))).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1.text(), "ok");
    }

    #[tokio::test]
    async fn clear_truncates_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.jsonl");

        let journal = Journal::open(&path, |_, _| {}).await.unwrap();
        journal.append(fp(1), Completion(json!({"text": "a"})));
        journal.clear();
        journal.shutdown().await;

        let mut loaded = Vec::new();
        Journal::open(&path, |fp, c| loaded.push((fp, c))).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn pending_writes_drops_to_zero_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = Journal::open(&path, |_, _| {}).await.unwrap();
        journal.append(fp(1), Completion(json!({"text": "a"})));
        journal.shutdown().await;
        assert_eq!(journal.pending_writes(), 0);
    }
}
