//! Multiprocess thread identifiers (`p<pid>.<tid>`).

use std::fmt;

/// A process/thread pair as addressed by the RSP multiprocess extension.
///
/// Each component is either a concrete id, [`ThreadId::ALL`] or
/// [`ThreadId::ANY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId {
    pub process_id: i64,
    pub thread_id: i64,
}

impl ThreadId {
    /// Selects every process or thread.
    pub const ALL: i64 = -1;
    /// Selects an arbitrary process or thread.
    pub const ANY: i64 = 0;

    pub fn new(process_id: i64, thread_id: i64) -> Self {
        Self {
            process_id,
            thread_id,
        }
    }

    /// All threads of one process (`ppid`, equivalent to `ppid.-1`).
    pub fn process(process_id: i64) -> Self {
        Self::new(process_id, Self::ALL)
    }

    /// A bare thread id, with no process given.
    pub fn thread(thread_id: i64) -> Self {
        Self::new(Self::ALL, thread_id)
    }

    pub fn is_all_processes(&self) -> bool {
        self.process_id == Self::ALL
    }

    pub fn is_all_threads(&self) -> bool {
        self.thread_id == Self::ALL
    }
}

/// Writes one id component: `-1` literally, anything else as upper-case hex.
fn fmt_component(value: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value < 0 {
        write!(f, "-1")
    } else {
        write!(f, "{:X}", value)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("p")?;
        fmt_component(self.process_id, f)?;
        f.write_str(".")?;
        fmt_component(self.thread_id, f)
    }
}
