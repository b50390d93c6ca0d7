use std::thread::JoinHandle;
use std::time::Duration;

/// Wait for `handle` to finish for up to `timeout`. Returns `Some(T)` if it
/// finished in time, `None` otherwise. On timeout the handle is handed off to
/// a detached watcher thread rather than joined on the caller's stack — Rust
/// has no API to forcefully kill a thread, so a writer wedged past its
/// deadline is abandoned rather than retried, matching the no-retry policy
/// for shutdown.
pub fn join_with_timeout<T: Send + 'static>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let result = handle.join();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(_)) => None, // the joined thread panicked
        Err(_) => None,     // timed out; watcher thread keeps the handle alive
    }
}
