//! Montage Engine - Background decode scheduling and clip lifetimes
//!
//! A fixed pool of decode workers steps each clip's background job; new
//! jobs go to the least-loaded worker at assignment time. A lifetime pool
//! keeps managed sources alive until nothing else references them, then a
//! periodic sweep deregisters their jobs from every worker before dropping
//! them, so a decode task never outlives the fifos it decodes into.

pub mod worker;

pub use worker::DecodeWorker;

use crossbeam_channel::{bounded, Receiver, Sender};
use montage_timeline::{BackgroundJob, JobScheduler, TimelineSource};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

/// Period of the lifetime sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct PoolEntry {
    source: Arc<dyn TimelineSource>,
    job: Option<Arc<dyn BackgroundJob>>,
    worker: Option<usize>,
}

struct EngineInner {
    workers: Vec<DecodeWorker>,
    pool: Mutex<Vec<PoolEntry>>,
}

impl EngineInner {
    fn sweep(&self) {
        let mut pool = self.pool.lock();
        let before = pool.len();
        pool.retain(|entry| {
            // strong_count == 1 means the pool holds the only reference:
            // no descriptor or caller can reach this clip anymore.
            if Arc::strong_count(&entry.source) > 1 {
                return true;
            }
            if let (Some(job), Some(worker)) = (&entry.job, entry.worker) {
                self.workers[worker].remove_job(job);
            }
            debug!(clip = %entry.source.name(), "released unreferenced clip");
            false
        });
        let released = before - pool.len();
        if released > 0 {
            debug!(released, remaining = pool.len(), "lifetime sweep");
        }
    }
}

impl JobScheduler for EngineInner {
    fn manage(&self, source: Arc<dyn TimelineSource>) {
        let mut pool = self.pool.lock();
        if pool.iter().any(|entry| Arc::ptr_eq(&entry.source, &source)) {
            return;
        }

        let job = source.background_job();
        let worker = job.as_ref().map(|job| {
            // Greedy least-loaded placement, evaluated at assignment time
            // only; jobs are not rebalanced later.
            let index = self
                .workers
                .iter()
                .min_by_key(|w| w.client_count())
                .map(|w| w.index())
                .unwrap_or(0);
            self.workers[index].add_job(Arc::clone(job));
            index
        });

        debug!(clip = %source.name(), worker, "clip managed");
        pool.push(PoolEntry {
            source,
            job,
            worker,
        });
    }
}

/// The engine: decode worker pool plus clip lifetime management.
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
    /// Dropping the sender closes the channel and stops the sweeper.
    sweep_stop: Option<Sender<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Create an engine with one worker per CPU, at least four.
    pub fn new() -> Self {
        Self::with_workers(num_cpus::get().max(4))
    }

    /// Create an engine with an explicit worker count.
    pub fn with_workers(num_workers: usize) -> Self {
        let workers = (0..num_workers.max(1)).map(DecodeWorker::spawn).collect();
        let inner = Arc::new(EngineInner {
            workers,
            pool: Mutex::new(Vec::new()),
        });

        let (sweep_stop, stop_rx) = bounded::<()>(0);
        let sweeper = {
            let inner = Arc::clone(&inner);
            std::thread::Builder::new()
                .name("montage-sweep".into())
                .spawn(move || run_sweeper(inner, stop_rx))
                .expect("failed to spawn sweep thread")
        };

        info!(workers = num_workers, "playback engine started");
        Self {
            inner,
            sweep_stop: Some(sweep_stop),
            sweeper: Some(sweeper),
        }
    }

    /// A weak handle for compositors to register their clips through.
    /// Every operation on the handle is a no-op once the engine is gone.
    pub fn handle(&self) -> Weak<dyn JobScheduler> {
        let scheduler: Arc<dyn JobScheduler> = Arc::clone(&self.inner) as Arc<dyn JobScheduler>;
        Arc::downgrade(&scheduler)
    }

    /// Take shared ownership of a source and schedule its decode job on
    /// the least-loaded worker.
    pub fn manage(&self, source: Arc<dyn TimelineSource>) {
        self.inner.manage(source);
    }

    /// Number of decode workers.
    pub fn num_workers(&self) -> usize {
        self.inner.workers.len()
    }

    /// Jobs per worker, in worker order.
    pub fn worker_loads(&self) -> Vec<usize> {
        self.inner.workers.iter().map(|w| w.client_count()).collect()
    }

    /// Number of clips currently kept alive by the pool.
    pub fn managed_clip_count(&self) -> usize {
        self.inner.pool.lock().len()
    }

    /// Run one lifetime sweep immediately. Normally the periodic sweep
    /// thread drives this.
    pub fn sweep_now(&self) {
        self.inner.sweep();
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.sweep_stop.take();
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.join();
        }
        // Workers join their threads as EngineInner drops
        info!("playback engine stopped");
    }
}

fn run_sweeper(inner: Arc<EngineInner>, stop: Receiver<()>) {
    loop {
        match stop.recv_timeout(SWEEP_INTERVAL) {
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => inner.sweep(),
            _ => break,
        }
    }
}
