//! Graceful-shutdown flag, flipped from the signal handler.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    // Only the store is allowed here; everything else happens on the main
    // loop once it notices the flag.
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Install handlers for SIGINT and SIGTERM.
pub fn install() {
    unsafe {
        libc::signal(libc::SIGINT, on_signal as usize);
        libc::signal(libc::SIGTERM, on_signal as usize);
    }
}

pub fn requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
