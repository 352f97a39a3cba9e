//! Job handles for spawned pipeline runs.

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::RunState;

/// Queryable status of a spawned job.
#[derive(Clone, Debug, PartialEq)]
pub enum JobStatus {
    /// The pipeline task is still running.
    Running,
    /// The run finished and its record was persisted.
    Completed { score: f64 },
    /// The run aborted; see the final state's error list.
    Failed { error: String },
}

impl JobStatus {
    /// Whether the job has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// The job task disappeared without producing a final state.
#[derive(Debug, Error)]
#[error("job {job_id} task aborted: {message}")]
pub struct JobError {
    pub job_id: String,
    pub message: String,
}

/// Handle to one spawned validation run.
///
/// Obtained from [`Engine::spawn`](super::Engine::spawn). Dropping the
/// handle does not cancel the job.
pub struct JobHandle {
    job_id: String,
    status: watch::Receiver<JobStatus>,
    join: JoinHandle<RunState>,
}

impl JobHandle {
    pub(crate) fn new(
        job_id: String,
        status: watch::Receiver<JobStatus>,
        join: JoinHandle<RunState>,
    ) -> Self {
        Self {
            job_id,
            status,
            join,
        }
    }

    /// The job identifier this handle tracks.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The latest observed status. Terminal once the run finishes.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Wait for the run to finish and return its final state.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] only when the job task itself was cancelled
    /// or panicked; expected pipeline failures are reported through the
    /// returned [`RunState`] instead.
    pub async fn wait(self) -> Result<RunState, JobError> {
        self.join.await.map_err(|err| JobError {
            job_id: self.job_id,
            message: err.to_string(),
        })
    }
}
