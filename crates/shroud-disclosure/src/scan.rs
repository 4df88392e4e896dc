//! Background region scanning on a worker pool.
//!
//! Enumerating a region's protected objects is proportional to the region's
//! volume, so it runs on worker threads. Workers only read world truth; their
//! findings come back through a bounded channel and are applied to sessions
//! by the tick context in [`drain_results`](RegionScanner::drain_results).

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use dashmap::DashMap;
use shroud_protocol::ConnectionId;
use shroud_world::{BlockPos, Material, MaterialRegistry, RegionPos, WorldId, WorldView};

use crate::error::EngineError;

/// A region to scan on behalf of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanRequest {
    /// Connection that received the region.
    pub connection: ConnectionId,
    /// World of the region.
    pub world: WorldId,
    /// Region to scan.
    pub region: RegionPos,
}

/// Protected objects found in one region.
#[derive(Debug)]
pub struct ScanResult {
    /// The originating request.
    pub request: ScanRequest,
    /// Protected positions with their materials.
    pub found: Vec<(BlockPos, Material)>,
}

/// Internal wrapper carrying the request and its connection's cancel flag.
struct QueuedScan {
    request: ScanRequest,
    cancelled: Arc<AtomicBool>,
}

/// Marks one queued scan finished when dropped, including on unwind.
struct InFlight<'a>(&'a AtomicU64);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Scans regions for protected objects across a thread pool.
pub struct RegionScanner {
    /// Sender for submitting scans; `None` after shutdown.
    request_sender: Mutex<Option<Sender<QueuedScan>>>,
    /// Receiver for completed scans, drained on the tick context.
    result_receiver: Receiver<ScanResult>,
    /// Cancellation flag per connection.
    cancel_flags: DashMap<ConnectionId, Arc<AtomicBool>>,
    /// Scans queued or executing.
    in_flight: Arc<AtomicU64>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RegionScanner {
    /// Starts `thread_count` workers reading from `world`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SubstrateUnavailable`] if a worker thread
    /// cannot be spawned.
    pub fn new(
        thread_count: usize,
        queue_capacity: usize,
        world: Arc<dyn WorldView>,
        registry: Arc<MaterialRegistry>,
    ) -> Result<Self, EngineError> {
        let (request_sender, request_receiver) = bounded::<QueuedScan>(queue_capacity);
        let (result_sender, result_receiver) = bounded::<ScanResult>(queue_capacity);
        let in_flight = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count.max(1) {
            let receiver = request_receiver.clone();
            let sender = result_sender.clone();
            let in_flight = Arc::clone(&in_flight);
            let world = Arc::clone(&world);
            let registry = Arc::clone(&registry);

            let handle = std::thread::Builder::new()
                .name(format!("region-scan-{index}"))
                .spawn(move || {
                    while let Ok(queued) = receiver.recv() {
                        let _done = InFlight(&in_flight);
                        if queued.cancelled.load(Ordering::Relaxed) {
                            continue;
                        }
                        let request = queued.request;
                        let scanned = panic::catch_unwind(AssertUnwindSafe(|| {
                            scan_region(world.as_ref(), &registry, request)
                        }));
                        let Ok(found) = scanned else {
                            tracing::warn!(?request, "region scan panicked, skipped");
                            continue;
                        };
                        if !queued.cancelled.load(Ordering::Relaxed)
                            && sender.try_send(ScanResult { request, found }).is_err()
                        {
                            tracing::debug!(?request, "scan result dropped");
                        }
                    }
                })
                .map_err(|e| EngineError::SubstrateUnavailable(e.to_string()))?;
            workers.push(handle);
        }

        tracing::debug!(workers = workers.len(), "region scanner started");
        Ok(Self {
            request_sender: Mutex::new(Some(request_sender)),
            result_receiver,
            cancel_flags: DashMap::new(),
            in_flight,
            workers: Mutex::new(workers),
        })
    }

    /// Queues a scan. Returns `false` if the queue is full or the scanner
    /// is shut down; the region is then left to the synchronous filter.
    pub fn submit(&self, request: ScanRequest) -> bool {
        let sender = self
            .request_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return false;
        };

        let cancelled = Arc::clone(
            self.cancel_flags
                .entry(request.connection)
                .or_insert_with(|| Arc::new(AtomicBool::new(false)))
                .value(),
        );
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        match sender.try_send(QueuedScan { request, cancelled }) {
            Ok(()) => true,
            Err(_) => {
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                tracing::debug!(?request, "scan queue full, region skipped");
                false
            }
        }
    }

    /// Cancels every queued or running scan of a connection.
    pub fn cancel_connection(&self, connection: ConnectionId) {
        if let Some((_, cancelled)) = self.cancel_flags.remove(&connection) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// Drains all completed scans. Call once per tick.
    pub fn drain_results(&self) -> Vec<ScanResult> {
        self.result_receiver.try_iter().collect()
    }

    /// Number of scans queued or executing.
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits until no scan is in flight. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while self.in_flight_count() > 0 {
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Stops accepting scans and joins the workers.
    pub fn shutdown(&self) {
        for entry in self.cancel_flags.iter() {
            entry.value().store(true, Ordering::Relaxed);
        }
        self.cancel_flags.clear();
        drop(
            self.request_sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("region scan worker panicked");
            }
        }
    }
}

impl Drop for RegionScanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Protected objects of one region. Runs on worker threads.
pub fn scan_region(
    world: &dyn WorldView,
    registry: &MaterialRegistry,
    request: ScanRequest,
) -> Vec<(BlockPos, Material)> {
    world
        .region_blocks(request.world, request.region)
        .into_iter()
        .filter(|(_, state)| registry.is_protected(state.material))
        .map(|(pos, state)| (pos, state.material))
        .collect()
}
