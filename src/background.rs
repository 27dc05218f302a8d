//! Work that outlives the request that started it.
//!
//! Tasks run inside a shared [`JoinSet`]. A task that panics is logged and forgotten; it
//! never takes down the worker or another task. At shutdown [`BackgroundTasks::drain`]
//! waits for whatever is still running, up to a grace period.
//!
//! Each actix worker has its own runtime, and those stop together with the server. The
//! server therefore pins background work to the main runtime with
//! [`BackgroundTasks::on_runtime`], which outlives the workers.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinSet};

#[derive(Debug, Default)]
pub struct BackgroundTasks {
    set: Mutex<JoinSet<()>>,
    runtime: Option<Handle>,
}

impl BackgroundTasks {
    /// Spawns onto whichever runtime calls [`spawn`](Self::spawn).
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns everything onto `runtime`.
    pub fn on_runtime(runtime: Handle) -> Self {
        Self {
            set: Mutex::default(),
            runtime: Some(runtime),
        }
    }

    /// Starts `task`. Finished tasks are reaped on the way in so the set stays small.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock();
        while let Some(finished) = set.try_join_next() {
            log_outcome(finished);
        }
        match &self.runtime {
            Some(runtime) => set.spawn_on(task, runtime),
            None => set.spawn(task),
        };
    }

    /// Tasks spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.set.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits up to `grace` for running tasks, then aborts the rest. Returns true when
    /// everything finished in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        let mut set = std::mem::take(&mut *self.set.lock());
        if set.is_empty() {
            return true;
        }
        log::info!("waiting for {} background task(s)", set.len());

        let finished = tokio::time::timeout(grace, async {
            while let Some(outcome) = set.join_next().await {
                log_outcome(outcome);
            }
        })
        .await;

        match finished {
            Ok(()) => true,
            Err(_) => {
                log::warn!(
                    "aborting {} background task(s) still running after {:?}",
                    set.len(),
                    grace
                );
                set.abort_all();
                false
            }
        }
    }
}

fn log_outcome(outcome: Result<(), JoinError>) {
    if let Err(error) = outcome {
        if error.is_panic() {
            log::error!("background task panicked: {}", error);
        } else {
            log::debug!("background task cancelled: {}", error);
        }
    }
}
