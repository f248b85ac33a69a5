//! SIGINT handling for the iteration loop.
//!
//! First Ctrl+C requests a graceful stop: the loop finishes the current
//! iteration, checkpoints, and exits with a summary. Second Ctrl+C
//! force-exits with status 130.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Global stop flag, registered once with SIGINT.
static STOP_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Register the SIGINT handler. Safe to call multiple times (only the first
/// call registers; subsequent calls are no-ops).
pub fn register_signal_handler() -> Result<()> {
    let flag = STOP_FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)));

    // First handler: set the flag on first Ctrl+C
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(flag))?;

    // Second handler: if the flag is already set (i.e. second Ctrl+C), force-exit
    let flag_clone = Arc::clone(flag);
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
            if flag_clone.load(Ordering::SeqCst) {
                std::process::exit(130);
            }
        })?;
    }

    Ok(())
}

/// Whether a graceful stop has been requested.
pub fn stop_requested() -> bool {
    STOP_FLAG
        .get()
        .map(|f| f.load(Ordering::SeqCst))
        .unwrap_or(false)
}

/// Clear the stop flag so a later run starts clean.
pub fn clear_stop() {
    if let Some(flag) = STOP_FLAG.get() {
        flag.store(false, Ordering::SeqCst);
    }
}
