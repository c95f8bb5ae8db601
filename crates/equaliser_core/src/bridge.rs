//! Parameter Bridge
//!
//! Hands immutable [`EngineConfig`] snapshots from the control thread to the
//! audio thread.
//!
//! ```text
//!   control ──publish──▶ [pending queue] ──acquire_latest──▶ audio
//!      ▲                                                        │
//!      └──────collect_garbage───── [retire queue] ◀──superseded─┘
//! ```
//!
//! Both queues are bounded crossbeam array channels, so neither side ever
//! blocks on the other. The audio side never frees a snapshot: whatever it
//! replaces is sent back and dropped on the control thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use equaliser_dsp::EngineConfig;

/// Pending snapshots the audio side has not picked up yet
pub const PENDING_CAPACITY: usize = 8;

// Between two collections the reader can hand back every pending snapshot
// plus the one it was holding
const RETIRE_CAPACITY: usize = PENDING_CAPACITY * 2 + 2;

/// A published configuration, stamped with its generation
#[derive(Debug)]
pub struct ConfigSnapshot {
    pub generation: u64,
    pub config: EngineConfig,
}

/// Control-side end of the bridge
pub struct ParameterBridge {
    pending_tx: Sender<Arc<ConfigSnapshot>>,
    // Kept to evict stale snapshots when the queue is full, and to hand
    // clones to readers
    pending_rx: Receiver<Arc<ConfigSnapshot>>,
    retire_tx: Sender<Arc<ConfigSnapshot>>,
    retire_rx: Receiver<Arc<ConfigSnapshot>>,
    latest: Mutex<Arc<ConfigSnapshot>>,
    active_generation: Arc<AtomicU64>,
    retire_failures: Arc<AtomicU64>,
}

impl ParameterBridge {
    pub fn new(initial: EngineConfig) -> Self {
        let (pending_tx, pending_rx) = bounded(PENDING_CAPACITY);
        let (retire_tx, retire_rx) = bounded(RETIRE_CAPACITY);
        Self {
            pending_tx,
            pending_rx,
            retire_tx,
            retire_rx,
            latest: Mutex::new(Arc::new(ConfigSnapshot {
                generation: 0,
                config: initial,
            })),
            active_generation: Arc::new(AtomicU64::new(0)),
            retire_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish a new configuration.
    ///
    /// If the audio side is behind and the queue is full, the oldest
    /// pending snapshot is dropped here; only the newest one matters.
    pub fn publish(&self, config: EngineConfig) -> Arc<ConfigSnapshot> {
        let mut latest = self.latest.lock();
        self.collect_garbage();

        let snapshot = Arc::new(ConfigSnapshot {
            generation: latest.generation + 1,
            config,
        });

        let mut item = Arc::clone(&snapshot);
        loop {
            match self.pending_tx.try_send(item) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    // Evicted snapshot is freed here, on the control thread
                    drop(self.pending_rx.try_recv());
                }
                // We own a receiver, so the channel cannot disconnect
                Err(TrySendError::Disconnected(_)) => break,
            }
        }

        *latest = Arc::clone(&snapshot);
        snapshot
    }

    /// Create the audio-side handle, seeded with the latest snapshot.
    ///
    /// Only one reader should be live at a time: readers share the
    /// pending queue and would otherwise split snapshots between them.
    pub fn reader(&self) -> ConfigReader {
        ConfigReader {
            pending: self.pending_rx.clone(),
            retire: self.retire_tx.clone(),
            current: self.latest(),
            active_generation: Arc::clone(&self.active_generation),
            retire_failures: Arc::clone(&self.retire_failures),
        }
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.latest.lock())
    }

    /// Generation the audio side last acquired
    pub fn active_generation(&self) -> u64 {
        self.active_generation.load(Ordering::Acquire)
    }

    /// Free snapshots the audio side has finished with; returns how many
    pub fn collect_garbage(&self) -> usize {
        self.retire_rx.try_iter().count()
    }

    /// Snapshots the audio side had to drop itself because the retire
    /// queue was full. Expected to stay at zero.
    pub fn retire_failures(&self) -> u64 {
        self.retire_failures.load(Ordering::Relaxed)
    }
}

/// Audio-side end of the bridge
#[derive(Debug)]
pub struct ConfigReader {
    pending: Receiver<Arc<ConfigSnapshot>>,
    retire: Sender<Arc<ConfigSnapshot>>,
    current: Arc<ConfigSnapshot>,
    active_generation: Arc<AtomicU64>,
    retire_failures: Arc<AtomicU64>,
}

impl ConfigReader {
    /// Newest available snapshot.
    ///
    /// Returns the very same `Arc` as the previous call when nothing was
    /// published in between, so callers can compare generations (or
    /// pointers) to skip work.
    ///
    /// # Real-time Safety
    /// Never blocks, never allocates, never frees a snapshot.
    #[inline]
    pub fn acquire_latest(&mut self) -> &Arc<ConfigSnapshot> {
        while let Ok(next) = self.pending.try_recv() {
            let superseded = if next.generation > self.current.generation {
                std::mem::replace(&mut self.current, next)
            } else {
                next
            };
            self.retire(superseded);
        }
        self.active_generation
            .store(self.current.generation, Ordering::Release);
        &self.current
    }

    /// Snapshot returned by the last `acquire_latest` (or the seed)
    pub fn current(&self) -> &Arc<ConfigSnapshot> {
        &self.current
    }

    fn retire(&self, snapshot: Arc<ConfigSnapshot>) {
        if self.retire.try_send(snapshot).is_err() {
            self.retire_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}
