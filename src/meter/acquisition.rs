//! Background acquisition loop
//!
//! One worker polls the meter at a fixed interval and publishes each
//! complete [`Reading`] by swapping an `Arc`. Readers load the current
//! snapshot without waiting on the worker. A failed poll is logged and the
//! previous snapshot stays published.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{MeterClient, MeterError, MeterResult, ReadMode, Reading};

/// Poll counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    pub polls_ok: u64,
    pub polls_failed: u64,
}

#[derive(Default)]
struct Counters {
    ok: AtomicU64,
    failed: AtomicU64,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps the latest meter reading fresh
pub struct AcquisitionLoop {
    client: Arc<dyn MeterClient>,
    mode: ReadMode,
    interval: Duration,
    snapshot: Arc<ArcSwapOption<Reading>>,
    counters: Arc<Counters>,
    worker: Mutex<Option<Worker>>,
}

impl AcquisitionLoop {
    /// `interval` must be non-zero
    pub fn new(client: Arc<dyn MeterClient>, mode: ReadMode, interval: Duration) -> Self {
        Self {
            client,
            mode,
            interval: interval.max(Duration::from_millis(1)),
            snapshot: Arc::new(ArcSwapOption::empty()),
            counters: Arc::new(Counters::default()),
            worker: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the worker. No-op if it is already running.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            debug!("Acquisition loop already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.client.clone(),
            self.mode,
            self.interval,
            self.snapshot.clone(),
            self.counters.clone(),
            cancel.clone(),
        ));

        info!(
            "Acquisition loop started ({} reads every {:?})",
            self.mode, self.interval
        );
        *worker = Some(Worker { cancel, handle });
    }

    /// Signal the worker and wait for it to exit. No-op if not running.
    ///
    /// A device read already in flight is allowed to finish first, so the
    /// meter is idle once this returns.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };

        worker.cancel.cancel();
        if let Err(e) = worker.handle.await {
            error!("Acquisition worker ended abnormally: {}", e);
        }
        info!("Acquisition loop stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    /// The latest published reading, if any poll has succeeded yet
    pub fn get_data(&self) -> Option<Arc<Reading>> {
        self.snapshot.load_full()
    }

    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            polls_ok: self.counters.ok.load(Ordering::Relaxed),
            polls_failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Direct read of one register, bypassing the snapshot
    pub async fn read_register(&self, register: u32) -> MeterResult<u16> {
        self.blocking(move |client| client.read_register(register)).await
    }

    /// Direct read of a register block, bypassing the snapshot
    pub async fn read_registers(&self, start: u32, count: u16) -> MeterResult<Vec<u16>> {
        self.blocking(move |client| client.read_registers(start, count))
            .await
    }

    /// Send a raw frame straight to the device
    pub async fn send_raw_command(&self, command: Vec<u8>) -> MeterResult<Vec<u8>> {
        self.blocking(move |client| client.send_raw_command(&command))
            .await
    }

    async fn blocking<T, F>(&self, f: F) -> MeterResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MeterClient) -> MeterResult<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || f(client.as_ref()))
            .await
            .map_err(|e| MeterError::Unavailable(e.to_string()))?
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}

async fn poll_loop(
    client: Arc<dyn MeterClient>,
    mode: ReadMode,
    interval: Duration,
    snapshot: Arc<ArcSwapOption<Reading>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    loop {
        let client = client.clone();
        let mut poll = tokio::task::spawn_blocking(move || mode.read(client.as_ref()));

        let result = tokio::select! {
            result = &mut poll => result,
            _ = cancel.cancelled() => {
                // finish the in-flight read, discard its result
                if let Err(e) = poll.await {
                    error!("Meter poll task panicked during shutdown: {}", e);
                }
                break;
            }
        };

        match result {
            Ok(Ok(reading)) => {
                debug!(
                    "Updated readings: power={}kW voltage={}V",
                    reading.power_kw, reading.voltage_v
                );
                snapshot.store(Some(Arc::new(reading)));
                counters.ok.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                warn!("Meter poll failed, keeping previous reading: {}", e);
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Meter poll task panicked: {}", e);
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Acquisition worker exiting");
}
