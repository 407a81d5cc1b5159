//! Graceful shutdown support via atomic flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

static GLOBAL: LazyLock<Shutdown> = LazyLock::new(Shutdown::new);

/// Cloneable handle to a shared shutdown flag.
///
/// The process-wide handle from [`Shutdown::global`] is the one set by the
/// SIGINT/SIGTERM handler; tests build private handles with [`Shutdown::new`].
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide handle (signal handlers, CLI)
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Check if shutdown was requested
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Request shutdown. Returns whether it had already been requested.
    ///
    /// Only touches an atomic, so it is safe to call from a signal handler.
    pub fn request(&self) -> bool {
        self.flag.swap(true, Ordering::Relaxed)
    }
}
