use crate::task::Task;

use std::collections::VecDeque;

/// Tasks waiting for admission, oldest first.
///
/// Nothing in here has been handed to an executor yet. The queue is unbounded: sustained
/// overload grows it rather than rejecting work.
#[derive(Debug, Default)]
pub struct PendingQueue {
    tasks: VecDeque<Task>,
}

impl PendingQueue {
    pub fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Puts a task back at the head, ahead of everything queued after it.
    pub fn push_front(&mut self, task: Task) {
        self.tasks.push_front(task);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
