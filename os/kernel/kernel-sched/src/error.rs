use crate::ThreadId;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("no free thread slot")]
    NoFreeSlot,
    #[error("thread {0} is not being created")]
    NotCreating(ThreadId),
    #[error("thread id {0} is out of range")]
    InvalidThread(ThreadId),
}
