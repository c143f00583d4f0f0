use super::Executor;
use crate::task::Task;

/// A FIFO executor with a single consumer.
///
/// Each task runs to completion before the next one is received. Clones feed the same queue,
/// and the consumer shuts down once the last clone is dropped and the backlog is drained.
#[derive(Debug, Clone)]
pub struct SerialQueue {
    task_sender: flume::Sender<Task>,
}

impl SerialQueue {
    pub fn new() -> Self {
        let (task_sender, task_receiver) = flume::unbounded::<Task>();

        Executor::shared_runtime().spawn(async move {
            tracing::debug!("Serial queue started");

            while let Ok(task) = task_receiver.recv_async().await {
                // Blocking tasks must not stall the runtime's async workers.
                let _ = tokio::task::spawn_blocking(move || task.run_contained()).await;
            }

            tracing::debug!("Serial queue drained and closed");
        });

        Self { task_sender }
    }

    pub fn push(&self, task: Task) {
        // The receiver lives as long as any sender, so this cannot fail.
        let _ = self.task_sender.send(task);
    }

    /// Tasks handed over but not yet started.
    pub fn len(&self) -> usize {
        self.task_sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_sender.is_empty()
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}
