//! Media engine workers and the worker pool
//!
//! Each worker models one isolated media-processing engine: a dedicated
//! task owning its own allocation state, addressed only through a command
//! channel. The pool spins up a fixed number of workers at startup and
//! hands them out round-robin with no load awareness.
//!
//! Failure semantics are deliberate: an engine dying is fatal to the whole
//! process. The pool publishes the failure on a watch channel; the server
//! binary logs it, waits a short grace delay so logs flush, and exits.
//! There is no in-process recovery.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::router::Router;
use super::rtp::RtpCapabilities;
use super::transport::{
    BitrateHints, DtlsParameters, DtlsRole, IceCandidate, IceParameters, TransportAllocation,
    TransportDirection,
};

/// Engine-level error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine task is gone
    Terminated,
    /// The engine's RTP port range is exhausted
    NoPortAvailable,
    /// The pool cannot be created with the given size
    InvalidPoolSize(usize),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Terminated => write!(f, "Media engine terminated"),
            EngineError::NoPortAvailable => write!(f, "No RTP port available"),
            EngineError::InvalidPoolSize(n) => write!(f, "Invalid worker pool size: {}", n),
        }
    }
}

impl std::error::Error for EngineError {}

/// Settings shared by every engine in the pool
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Address the engines bind media sockets on
    pub listen_ip: IpAddr,
    /// Public-facing address advertised in ICE candidates
    pub announced_ip: IpAddr,
    /// Port range media transports are allocated from, per engine
    pub rtp_port_range: RangeInclusive<u16>,
    /// Bitrate floor/ceiling hints applied to every transport
    pub bitrate: BitrateHints,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            announced_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            rtp_port_range: 40_000..=49_999,
            bitrate: BitrateHints::default(),
        }
    }
}

/// Commands understood by an engine task
pub(crate) enum EngineCommand {
    AllocateTransport {
        direction: TransportDirection,
        reply: oneshot::Sender<Result<TransportAllocation, EngineError>>,
    },
    ReleaseTransport {
        id: Uuid,
    },
}

/// Cloneable sender half of an engine's command channel
#[derive(Clone)]
pub(crate) struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// Best-effort send; a dead engine is reported through the pool's
    /// fatal watch, not through every caller.
    pub(crate) fn send(&self, cmd: EngineCommand) {
        let _ = self.tx.send(cmd);
    }

    pub(crate) async fn allocate_transport(
        &self,
        direction: TransportDirection,
    ) -> Result<TransportAllocation, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::AllocateTransport { direction, reply })
            .map_err(|_| EngineError::Terminated)?;
        rx.await.map_err(|_| EngineError::Terminated)?
    }
}

/// One pooled media engine and its router
pub struct Worker {
    id: usize,
    router: Router,
    abort: AbortHandle,
}

impl Worker {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}

/// Fixed-size pool of media engines, selected round-robin
pub struct WorkerPool {
    workers: Vec<Worker>,
    next: AtomicUsize,
    fatal_rx: watch::Receiver<Option<String>>,
    shutting_down: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spin up `pool_size` engines, each producing a router configured
    /// with the fixed codec set.
    pub fn initialize(pool_size: usize, settings: EngineSettings) -> Result<Self, EngineError> {
        if pool_size == 0 {
            return Err(EngineError::InvalidPoolSize(pool_size));
        }

        let (fatal_tx, fatal_rx) = watch::channel(None);
        let fatal_tx = Arc::new(fatal_tx);
        let shutting_down = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(pool_size);

        for worker_id in 0..pool_size {
            let (tx, rx) = mpsc::unbounded_channel();
            let handle = EngineHandle { tx };

            let join = tokio::spawn(engine_loop(worker_id, settings.clone(), rx));
            let abort = join.abort_handle();

            let fatal = Arc::clone(&fatal_tx);
            let flag = Arc::clone(&shutting_down);
            tokio::spawn(async move {
                let result = join.await;
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                let reason = match result {
                    Ok(()) => format!("engine {} exited unexpectedly", worker_id),
                    Err(e) => format!("engine {} died: {}", worker_id, e),
                };
                tracing::error!(worker = worker_id, %reason, "Media engine failure");
                let _ = fatal.send(Some(reason));
            });

            let router = Router::new(
                Uuid::new_v4(),
                RtpCapabilities::supported(),
                settings.bitrate,
                handle,
            );

            tracing::info!(worker = worker_id, router = %router.id(), "Media engine started");
            workers.push(Worker {
                id: worker_id,
                router,
                abort,
            });
        }

        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
            fatal_rx,
            shutting_down,
        })
    }

    /// Round-robin worker selection, no load awareness
    pub fn select(&self) -> &Worker {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[index]
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Watch for engine death. The value becomes `Some(reason)` exactly
    /// once; the process is expected to exit shortly after.
    pub fn fatal_watch(&self) -> watch::Receiver<Option<String>> {
        self.fatal_rx.clone()
    }

    /// Stop every engine without signalling a fatal failure
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        for worker in &self.workers {
            worker.abort.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn crash_worker(&self, index: usize) {
        self.workers[index].abort.abort();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The engine task: owns port allocation for its transports.
///
/// Runs until its command channel closes or the pool aborts it.
async fn engine_loop(
    worker_id: usize,
    settings: EngineSettings,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
) {
    let mut allocated: HashMap<Uuid, u16> = HashMap::new();
    let mut cursor = *settings.rtp_port_range.start();

    while let Some(cmd) = commands.recv().await {
        match cmd {
            EngineCommand::AllocateTransport { direction, reply } => {
                let result = allocate(&settings, &mut allocated, &mut cursor);
                if let Ok(ref alloc) = result {
                    tracing::debug!(
                        worker = worker_id,
                        transport = %alloc.id,
                        %direction,
                        port = alloc.port,
                        "Transport allocated"
                    );
                }
                let _ = reply.send(result);
            }
            EngineCommand::ReleaseTransport { id } => {
                if let Some(port) = allocated.remove(&id) {
                    tracing::debug!(worker = worker_id, transport = %id, port, "Port released");
                }
            }
        }
    }

    tracing::debug!(worker = worker_id, "Engine loop ended");
}

fn allocate(
    settings: &EngineSettings,
    allocated: &mut HashMap<Uuid, u16>,
    cursor: &mut u16,
) -> Result<TransportAllocation, EngineError> {
    let range = settings.rtp_port_range.clone();
    let span = (*range.end() - *range.start()) as usize + 1;

    if allocated.len() >= span {
        return Err(EngineError::NoPortAvailable);
    }

    let in_use: std::collections::HashSet<u16> = allocated.values().copied().collect();
    let mut port = *cursor;
    loop {
        if !in_use.contains(&port) {
            break;
        }
        port = if port == *range.end() { *range.start() } else { port + 1 };
    }
    *cursor = if port == *range.end() { *range.start() } else { port + 1 };

    let id = Uuid::new_v4();
    allocated.insert(id, port);

    Ok(TransportAllocation {
        id,
        port,
        ice_parameters: IceParameters::generate(),
        ice_candidates: IceCandidate::host_pair(settings.announced_ip, port),
        dtls_parameters: DtlsParameters::generate(DtlsRole::Auto),
    })
}
