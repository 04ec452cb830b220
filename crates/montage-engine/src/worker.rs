//! Decode worker threads.
//!
//! Each worker owns one thread and a list of jobs it steps cooperatively.
//! When every job reports idle the thread parks on its wake channel with a
//! timeout instead of spinning; adding or removing a job wakes it.

use crossbeam_channel::{bounded, Receiver, Sender};
use montage_timeline::{BackgroundJob, JobOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

/// How long an idle worker sleeps before re-polling its jobs. Fifo space
/// freed by the audio callback does not signal the channel, so the timeout
/// doubles as the backpressure retry interval.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// One decode thread and the jobs assigned to it.
pub struct DecodeWorker {
    index: usize,
    jobs: Arc<Mutex<Vec<Arc<dyn BackgroundJob>>>>,
    wake: Sender<()>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    /// Spawn a worker thread.
    pub fn spawn(index: usize) -> Self {
        let jobs: Arc<Mutex<Vec<Arc<dyn BackgroundJob>>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (wake, wake_rx) = bounded::<()>(1);

        let thread = {
            let jobs = Arc::clone(&jobs);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name(format!("montage-decode-{index}"))
                .spawn(move || run_worker(index, jobs, shutdown, wake_rx))
                .expect("failed to spawn decode worker")
        };

        Self {
            index,
            jobs,
            wake,
            shutdown,
            thread: Some(thread),
        }
    }

    /// Worker index within the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of jobs currently assigned, the load metric for placement.
    pub fn client_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Assign a job to this worker.
    pub fn add_job(&self, job: Arc<dyn BackgroundJob>) {
        self.jobs.lock().push(job);
        let _ = self.wake.try_send(());
    }

    /// Remove a job. Returns whether it was assigned here.
    pub fn remove_job(&self, job: &Arc<dyn BackgroundJob>) -> bool {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|candidate| !Arc::ptr_eq(candidate, job));
        let removed = jobs.len() != before;
        drop(jobs);
        if removed {
            let _ = self.wake.try_send(());
        }
        removed
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.wake.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_worker(
    index: usize,
    jobs: Arc<Mutex<Vec<Arc<dyn BackgroundJob>>>>,
    shutdown: Arc<AtomicBool>,
    wake: Receiver<()>,
) {
    debug!(worker = index, "decode worker started");
    while !shutdown.load(Ordering::Acquire) {
        // Snapshot under a short lock; stepping runs without it so job
        // assignment never waits on a decode step.
        let snapshot: Vec<Arc<dyn BackgroundJob>> = jobs.lock().clone();

        let mut any_progress = false;
        for job in &snapshot {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            if job.step() == JobOutcome::MoreWork {
                any_progress = true;
            }
        }

        if !any_progress {
            trace!(worker = index, "all jobs idle");
            let _ = wake.recv_timeout(IDLE_POLL);
        }
    }
    debug!(worker = index, "decode worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingJob {
        steps: AtomicUsize,
        budget: usize,
        suspended: AtomicBool,
    }

    impl CountingJob {
        fn new(budget: usize) -> Arc<Self> {
            Arc::new(Self {
                steps: AtomicUsize::new(0),
                budget,
                suspended: AtomicBool::new(false),
            })
        }
    }

    impl BackgroundJob for CountingJob {
        fn step(&self) -> JobOutcome {
            if self.suspended.load(Ordering::Acquire) {
                return JobOutcome::Idle;
            }
            let done = self.steps.fetch_add(1, Ordering::AcqRel);
            if done + 1 >= self.budget {
                JobOutcome::Finished
            } else {
                JobOutcome::MoreWork
            }
        }

        fn set_suspended(&self, suspended: bool) {
            self.suspended.store(suspended, Ordering::Release);
        }

        fn is_suspended(&self) -> bool {
            self.suspended.load(Ordering::Acquire)
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_worker_steps_jobs() {
        let worker = DecodeWorker::spawn(0);
        let job = CountingJob::new(50);
        worker.add_job(job.clone() as Arc<dyn BackgroundJob>);

        assert!(wait_until(|| job.steps.load(Ordering::Acquire) >= 50));
        assert_eq!(worker.client_count(), 1);
    }

    #[test]
    fn test_suspended_job_is_not_stepped() {
        let worker = DecodeWorker::spawn(0);
        let job = CountingJob::new(usize::MAX);
        job.set_suspended(true);
        worker.add_job(job.clone() as Arc<dyn BackgroundJob>);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(job.steps.load(Ordering::Acquire), 0);

        job.set_suspended(false);
        assert!(wait_until(|| job.steps.load(Ordering::Acquire) > 0));
    }

    #[test]
    fn test_remove_job() {
        let worker = DecodeWorker::spawn(0);
        let job = CountingJob::new(usize::MAX);
        let handle = job.clone() as Arc<dyn BackgroundJob>;
        worker.add_job(handle.clone());
        assert_eq!(worker.client_count(), 1);

        assert!(worker.remove_job(&handle));
        assert!(!worker.remove_job(&handle));
        assert_eq!(worker.client_count(), 0);
    }

    #[test]
    fn test_worker_shuts_down_cleanly() {
        let worker = DecodeWorker::spawn(3);
        let job = CountingJob::new(usize::MAX);
        worker.add_job(job as Arc<dyn BackgroundJob>);
        drop(worker); // must join without hanging
    }
}
