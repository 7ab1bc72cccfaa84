use log::info;
use std::future::Future;
use tokio::{select, signal};
/// TaskManager spawns and supervises one task loop per simulated rank of a solver run.
///
/// - Spawn one long-running task per rank, identified by its `RankId` rather than an
///   arbitrary label, so supervision stays tied to the rank that owns the task.
/// - Break a rank's task loop when one of the following happens:
///     - SIGterm or SIGint is received
///     - External cancellation token is triggered (e.g. a sibling rank's transport
///       call returned a fatal error, which should stop every other rank too since the
///       collective ghost exchange can no longer make progress without it)
///
/// TaskManager extends tokio_util::task::TaskTracker to ensure that every rank's task
/// loop is tracked and has the chance to perform any necessary cleanup before ending.
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use mg_types::RankId;

#[derive(Debug, Clone)]
pub struct TaskManager {
    cancellation_token: CancellationToken,
    task_tracker: TaskTracker,
}

#[derive(Debug, Clone)]
pub struct TaskManagerGuard {
    cancellation_token: CancellationToken,
    rank: RankId,
}

impl TaskManagerGuard {
    pub fn rank(&self) -> RankId {
        self.rank
    }

    pub async fn is_cancelled(&self) {
        let rank = self.rank;
        select! {
            // We use biased selection as it would order our futures according to physical
            // arrangements below
            // We want shutdown signals to always be checked for first, hence the arrangements
            biased;

            _ = signal::ctrl_c() => {
                info!("Received Ctrl-C signal, cancelling rank {rank}'s task");
            }
            _ = self.cancellation_token.cancelled() => {
                info!("Received cancellation token signal, cancelling rank {rank}'s task");
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            cancellation_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    fn guard(&self, rank: RankId) -> TaskManagerGuard {
        TaskManagerGuard {
            rank,
            cancellation_token: self.cancellation_token.clone(),
        }
    }

    pub async fn spawn_task_loop<T, F>(&self, task: F, rank: RankId)
    where
        T: Future<Output = ()> + Send + 'static,
        F: FnOnce(TaskManagerGuard) -> T + Send + 'static,
    {
        let guard = self.guard(rank);

        self.task_tracker.spawn(task(guard));
        log::debug!("Spawned task for rank {rank}");
    }

    pub fn cancel_all(&self) {
        self.cancellation_token.cancel()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub async fn wait(&self) {
        self.task_tracker.close();
        self.task_tracker.wait().await
    }

    pub fn task_count(&self) -> usize {
        self.task_tracker.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_task_runs_and_is_tracked() {
        let manager = TaskManager::new();
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_clone = ran.clone();

        manager
            .spawn_task_loop(
                move |guard| async move {
                    assert_eq!(guard.rank(), 3);
                    ran_clone.store(true, std::sync::atomic::Ordering::SeqCst);
                },
                3,
            )
            .await;

        manager.wait().await;
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_all_trips_every_guards_token() {
        let manager = TaskManager::new();
        let guard_a = manager.guard(0);
        let guard_b = manager.guard(1);
        manager.cancel_all();

        tokio::select! {
            _ = guard_a.cancellation_token.cancelled() => {}
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => panic!("guard_a never saw the cancellation"),
        }
        tokio::select! {
            _ = guard_b.cancellation_token.cancelled() => {}
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => panic!("guard_b never saw the cancellation"),
        }
    }
}
