//! Run/dump flags driven by process signals.
//!
//! SIGINT requests a graceful stop; SIGUSR1 and SIGUSR2 request a
//! probability dump at the next reporting tick. Each flag has a single
//! writer (the signal handler) and a single reader (the analysis loop),
//! so relaxed atomics suffice.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGUSR1, SIGUSR2};
use signal_hook::flag;

/// Shared control flags of an analysis run.
#[derive(Clone, Default)]
pub struct Flags {
    stop: Arc<AtomicBool>,
    dump: Arc<AtomicBool>,
}

impl Flags {
    pub fn new() -> Self {
        Flags::default()
    }

    /// Register the signal handlers. The registrations stay in place
    /// for the rest of the process.
    pub fn install(&self) -> io::Result<()> {
        flag::register(SIGINT, Arc::clone(&self.stop))?;
        flag::register(SIGUSR1, Arc::clone(&self.dump))?;
        flag::register(SIGUSR2, Arc::clone(&self.dump))?;
        Ok(())
    }

    /// Whether the analysis loop should keep going.
    pub fn running(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    /// Ask the analysis loop to finish its current iteration and stop.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Ask for a probability dump at the next reporting tick.
    pub fn request_dump(&self) {
        self.dump.store(true, Ordering::Relaxed);
    }

    /// Consume a pending dump request, if any.
    pub fn take_dump_request(&self) -> bool {
        self.dump.swap(false, Ordering::Relaxed)
    }
}
