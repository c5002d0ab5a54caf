use std::io;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::wal::{Replay, Wal};

/// Durable storage for engine events.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Durably append one event. Returns only after the event is committed.
    async fn append(&self, event: &Event) -> io::Result<()>;

    /// Replace the log with `events`, a minimal rewrite of the current state.
    async fn compact(&self, events: Vec<Event>) -> io::Result<()>;

    async fn appends_since_compact(&self) -> u64;
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Disk-backed log. A background task owns the WAL and batches appends so
/// concurrent commits share one fsync.
pub struct WalLog {
    tx: mpsc::Sender<WalCommand>,
}

impl WalLog {
    /// Replay the log at `path`, cut off any torn tail, then open it for
    /// appends. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<(Self, Replay)> {
        let replay = Wal::replay(path)?;
        if replay.discarded_tail {
            Wal::truncate(path, replay.valid_len)?;
        }
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        Ok((Self { tx }, replay))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WalCommand,
    ) -> io::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| io::Error::other("WAL writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("WAL writer dropped response"))
    }
}

#[async_trait]
impl EventLog for WalLog {
    async fn append(&self, event: &Event) -> io::Result<()> {
        let event = event.clone();
        self.request(|response| WalCommand::Append { event, response })
            .await?
    }

    async fn compact(&self, events: Vec<Event>) -> io::Result<()> {
        self.request(|response| WalCommand::Compact { events, response })
            .await?
    }

    async fn appends_since_compact(&self) -> u64 {
        match self
            .request(|response| WalCommand::AppendsSinceCompact { response })
            .await
        {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("cannot read WAL append count: {e}");
                0
            }
        }
    }
}

/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::warn!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// All or nothing: on any error the partial batch is cut back off the file,
/// so a caller told "failed" never finds its event replayed later.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err() {
        if let Err(e) = wal.rollback() {
            tracing::warn!("WAL rollback after failed batch also failed: {e}");
        }
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|len| wal.swap_compact_file(len));
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// In-process log for ephemeral engines and tests. Keeps every event in order.
#[derive(Default)]
pub struct MemoryLog {
    inner: Mutex<MemoryLogInner>,
}

#[derive(Default)]
struct MemoryLogInner {
    events: Vec<Event>,
    appends_since_compact: u64,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything currently in the log.
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLogInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn append(&self, event: &Event) -> io::Result<()> {
        let mut inner = self.lock();
        inner.events.push(event.clone());
        inner.appends_since_compact += 1;
        Ok(())
    }

    async fn compact(&self, events: Vec<Event>) -> io::Result<()> {
        let mut inner = self.lock();
        inner.events = events;
        inner.appends_since_compact = 0;
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.lock().appends_since_compact
    }
}
