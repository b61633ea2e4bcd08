//! Runner lifecycles: a standalone [`local::LocalRunner`] and a
//! master-driven [`slave::SlaveRunner`] state machine, sharing the same
//! [`RunnerState`] vocabulary.

mod local;
mod slave;

pub use local::LocalRunner;
pub use slave::SlaveRunner;

/// Lifecycle state shared by both runner variants. A local runner never
/// enters `Missing` — that transition only applies to a slave that has lost
/// contact with its master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Ready,
    Spawning,
    Running,
    Stopped,
    Missing,
}
