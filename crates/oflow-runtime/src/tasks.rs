use std::{collections::HashMap, future::Future, time::Duration};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::ControllerError;

/// A handle the caller can use to refer back to a scheduled task; not
/// otherwise inspectable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TaskId(u64);

/// A named group of background tasks, bulk-cancelled together (§4.F). One
/// instance exists per Datapath plus a process-wide "global" scope; the
/// controller also uses short-lived phase scopes (`PRESTART`, `START`,
/// `STOP`).
pub struct TaskScope {
    name: String,
    next_id: u64,
    tasks: HashMap<TaskId, JoinHandle<()>>,
}

impl TaskScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: 0,
            tasks: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of tasks currently tracked in this scope.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Schedules `work` on the runtime and tracks it under this scope. The
    /// task body never runs inline — `tokio::spawn` guarantees the first
    /// poll happens after this call returns and the executor yields.
    pub fn create_task<F>(&mut self, work: F) -> TaskId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let handle = tokio::spawn(work);
        self.tasks.insert(id, handle);
        id
    }

    /// Requests cancellation of every task in the scope. Does not block;
    /// tasks observe the abort at their next suspension point.
    pub fn cancel(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    /// Waits up to `deadline` for all outstanding tasks to finish, reaping
    /// completed ones as they resolve. Tasks already aborted by
    /// [`TaskScope::cancel`] resolve immediately with a cancelled join
    /// error, which counts as finished here.
    pub async fn wait_cancelled(&mut self, deadline: Duration) -> Result<(), ControllerError> {
        let budget = tokio::time::Instant::now() + deadline;
        let ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        for id in ids {
            let Some(handle) = self.tasks.get_mut(&id) else {
                continue;
            };
            let remaining = budget.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(_) => {
                    self.tasks.remove(&id);
                }
                Err(_) => {
                    debug!(scope = %self.name, ?id, "task did not finish within the wait deadline");
                }
            }
        }

        if self.tasks.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::TasksDidNotExit {
                scope: self.name.clone(),
                remaining: self.tasks.len(),
                deadline,
            })
        }
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn create_task_runs_after_the_current_step_yields() {
        let ran = Arc::new(AtomicBool::new(false));
        let mut scope = TaskScope::new("global");
        let flag = ran.clone();
        scope.create_task(async move {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(!ran.load(Ordering::SeqCst), "task body must not run inline");
        scope.wait_cancelled(Duration::from_millis(100)).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_aborts_pending_tasks() {
        let mut scope = TaskScope::new("dp-1");
        scope.create_task(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        scope.cancel();
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn wait_cancelled_reports_tasks_still_running() {
        let mut scope = TaskScope::new("global");
        scope.create_task(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let result = scope.wait_cancelled(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ControllerError::TasksDidNotExit { .. })));
    }
}
