//! Cooperative background work units.
//!
//! A clip that needs background decoding exposes one [`BackgroundJob`].
//! Decode workers call [`step`](BackgroundJob::step) repeatedly; a job does
//! a short slice of work per call and yields by returning [`JobOutcome::Idle`]
//! when its fifos are full, which is how backpressure reaches the scheduler
//! without blocking anything.

/// Result of one job step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Progress was made and more work is immediately available.
    MoreWork,
    /// Nothing to do right now; try again on a later slice.
    Idle,
    /// The job has no further work ever (source exhausted or closed).
    Finished,
}

/// A schedulable decode task, shared between its clip and the worker pool.
pub trait BackgroundJob: Send + Sync {
    /// Perform one short, non-blocking slice of work.
    fn step(&self) -> JobOutcome;

    /// Suspend or resume the job. A suspended job reports
    /// [`JobOutcome::Idle`] without touching its fifos; seeks suspend the
    /// job while cursors are repositioned.
    fn set_suspended(&self, suspended: bool);

    /// Whether the job is currently suspended.
    fn is_suspended(&self) -> bool;
}
