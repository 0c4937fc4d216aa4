use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::ProtocolError;
use super::protocol::Protocol;
use crate::constants::{ERROR_BACKOFF, IDLE_BACKOFF, TRY_AGAIN_BACKOFF, WORKER_THREADS};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Worker threads polling the protocol.
    pub threads: usize,
    /// Sleep after a poll that found nothing to do.
    pub idle_backoff: Duration,
    /// Sleep after losing the race for the network.
    pub try_again_backoff: Duration,
    /// Sleep after a failed poll.
    pub error_backoff: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            threads: WORKER_THREADS,
            idle_backoff: IDLE_BACKOFF,
            try_again_backoff: TRY_AGAIN_BACKOFF,
            error_backoff: ERROR_BACKOFF,
        }
    }
}

/// A running DHT node: a pool of worker threads driving one [`Protocol`].
///
/// Dropping the node stops and joins its workers.
pub struct Node<S: Store + 'static> {
    protocol: Arc<Protocol<S>>,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: Store + 'static> Node<S> {
    pub fn start(protocol: Arc<Protocol<S>>, config: &NodeConfig) -> Result<Self, ProtocolError> {
        let threads = config.threads.max(1);
        info!("Node ID: {}", protocol.id());
        info!("Interface: {}", protocol.network().interface());
        info!("Starting {} worker threads", threads);

        let node = Self {
            protocol,
            running: Arc::new(AtomicBool::new(true)),
            workers: Mutex::new(Vec::with_capacity(threads)),
        };

        for index in 0..threads {
            let protocol = Arc::clone(&node.protocol);
            let running = Arc::clone(&node.running);
            let config = config.clone();
            let spawned = thread::Builder::new()
                .name(format!("kdt-worker-{}", index))
                .spawn(move || work(&protocol, &running, &config));

            match spawned {
                Ok(handle) => node.workers.lock().push(handle),
                Err(e) => {
                    node.shutdown();
                    return Err(ProtocolError::Spawn(e));
                }
            }
        }

        Ok(node)
    }

    pub fn protocol(&self) -> &Arc<Protocol<S>> {
        &self.protocol
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the workers and waits for them to exit. Later calls do nothing.
    pub fn shutdown(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
        info!("Node stopped");
    }
}

impl<S: Store + 'static> Drop for Node<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn work<S: Store>(protocol: &Protocol<S>, running: &AtomicBool, config: &NodeConfig) {
    debug!("Worker started");
    while running.load(Ordering::Acquire) {
        match protocol.poll() {
            Ok(()) => {}
            Err(ProtocolError::NotFound) => thread::sleep(config.idle_backoff),
            Err(ProtocolError::TryAgain) => thread::sleep(config.try_again_backoff),
            Err(e) => {
                warn!("Poll failed: {}", e);
                thread::sleep(config.error_backoff);
            }
        }
    }
    debug!("Worker stopped");
}
