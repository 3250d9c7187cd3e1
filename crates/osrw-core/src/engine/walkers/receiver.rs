use super::{CommError, WalkerComm};
use crate::engine::store::HistogramStore;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on how long the receiver waits before re-checking for cancellation.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(50);

/// Background thread that records the observations other walkers send asynchronously.
///
/// The thread runs until the receiver is dropped or the transport disconnects. Dropping
/// the receiver signals the thread and joins it, which takes at most one
/// [`RECEIVE_TIMEOUT`].
pub struct AsyncReceiver {
    cancelled: Arc<AtomicBool>,
    received: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncReceiver {
    pub fn spawn(comm: Arc<dyn WalkerComm>, store: Arc<HistogramStore>) -> io::Result<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let received = Arc::new(AtomicU64::new(0));
        let rank = comm.rank();

        let handle = thread::Builder::new()
            .name(format!("osrw-receiver-{rank}"))
            .spawn({
                let cancelled = Arc::clone(&cancelled);
                let received = Arc::clone(&received);
                move || receive_loop(comm.as_ref(), &store, &cancelled, &received)
            })?;

        Ok(Self {
            cancelled,
            received,
            handle: Some(handle),
        })
    }

    /// Observations recorded so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AsyncReceiver {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("OSRW receiver thread panicked.");
            }
        }
    }
}

fn receive_loop(
    comm: &dyn WalkerComm,
    store: &HistogramStore,
    cancelled: &AtomicBool,
    received: &AtomicU64,
) {
    debug!("Receiver for walker {} started.", comm.rank());
    while !cancelled.load(Ordering::Acquire) {
        match comm.receive(RECEIVE_TIMEOUT) {
            Ok(Some(observation)) => {
                trace!(
                    "Received L={:.4} F_L={:.4}.",
                    observation.lambda, observation.flambda
                );
                store.record(observation);
                received.fetch_add(1, Ordering::AcqRel);
            }
            Ok(None) => {}
            Err(CommError::Disconnected { rank }) => {
                info!("Walker {} disconnected; stopping the OSRW receiver.", rank);
                break;
            }
            Err(e) => warn!("Asynchronous multi-walker receive failed: {}", e),
        }
    }
    debug!("Receiver for walker {} stopped.", comm.rank());
}
