use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::error::Error;

/// A stop request shared between the query pipeline and whoever may
/// interrupt it (Ctrl-C, read-aloud stop).
///
/// Clones observe the same flag. The flag also knows whether a query is
/// running, so an interrupt can tell "stop this query" apart from "quit".
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Fails with [`Halt::Stopped`] once a stop was requested.
    pub fn checkpoint(&self) -> Step<()> {
        if self.is_cancelled() {
            Err(Halt::Stopped)
        } else {
            Ok(())
        }
    }

    /// Clear any earlier stop request and mark a query as running until the
    /// guard is dropped.
    pub fn begin_query(&self) -> RunningQuery {
        self.reset();
        self.running.store(true, Ordering::SeqCst);
        RunningQuery {
            running: Arc::clone(&self.running),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the running query.
    ///
    /// Returns `false` when there is nothing left to stop: no query is
    /// running, or this query was already asked to stop.
    pub fn interrupt(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        !self.stop.swap(true, Ordering::SeqCst)
    }
}

/// Marks a query as running while alive.
#[derive(Debug)]
pub struct RunningQuery {
    running: Arc<AtomicBool>,
}

impl Drop for RunningQuery {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Why a pipeline step did not produce a value.
#[derive(Debug)]
pub enum Halt {
    Stopped,
    Failed(Error),
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Self::Failed(e)
    }
}

pub type Step<T> = std::result::Result<T, Halt>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancellationFlag::new();
        let other = flag.clone();
        assert!(!flag.is_cancelled());

        other.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.checkpoint(), Err(Halt::Stopped)));

        flag.reset();
        assert!(!other.is_cancelled());
        assert!(other.checkpoint().is_ok());
    }

    #[test]
    fn visible_across_threads() {
        let flag = CancellationFlag::new();
        let remote = flag.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn interrupt_only_stops_a_running_query() {
        let flag = CancellationFlag::new();
        assert!(!flag.interrupt());
        assert!(!flag.is_cancelled());

        let query = flag.begin_query();
        assert!(flag.is_running());
        assert!(flag.interrupt());
        assert!(flag.is_cancelled());
        // A second interrupt for the same query asks for more than a stop.
        assert!(!flag.interrupt());

        drop(query);
        assert!(!flag.is_running());
        assert!(!flag.interrupt());
    }

    #[test]
    fn begin_query_clears_an_earlier_stop() {
        let flag = CancellationFlag::new();
        flag.cancel();
        let _query = flag.begin_query();
        assert!(!flag.is_cancelled());
        assert!(flag.interrupt());
    }

    #[test]
    fn errors_convert_to_failed() {
        let halt: Halt = Error::Config("bad".to_string()).into();
        assert!(matches!(halt, Halt::Failed(Error::Config(_))));
    }
}
