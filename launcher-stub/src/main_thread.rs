//! Main-thread handoff for UI-hosting builds.
//!
//! Some UI subsystems only work when their event loop owns the OS main
//! thread. The launch moves to a worker and the main thread runs the loop.

use std::thread;

use log::debug;

use crate::error::LaunchError;

/// Runs `job` on a worker thread and `event_loop` on the calling thread.
///
/// In a real build `job` ends the process and `event_loop` never returns.
/// If the loop does return, the worker's exit code is waited for.
pub fn cede_main_thread<J, E>(job: J, event_loop: E) -> Result<i32, LaunchError>
where
    J: FnOnce() -> i32 + Send + 'static,
    E: FnOnce(),
{
    let worker = thread::Builder::new()
        .name("launcher-main".into())
        .spawn(job)
        .map_err(LaunchError::Thread)?;
    debug!("Handing the main thread to the event loop");
    event_loop();
    worker.join().map_err(|_| LaunchError::WorkerPanicked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn job_runs_off_the_calling_thread() {
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();
        let code = cede_main_thread(
            move || {
                tx.send(thread::current().id()).unwrap();
                42
            },
            || {},
        )
        .unwrap();
        assert_eq!(code, 42);
        assert_ne!(rx.recv().unwrap(), caller);
    }

    #[test]
    fn event_loop_owns_the_calling_thread() {
        let caller = thread::current().id();
        let mut loop_thread = None;
        cede_main_thread(|| 0, || loop_thread = Some(thread::current().id())).unwrap();
        assert_eq!(loop_thread, Some(caller));
    }

    #[test]
    fn worker_panic_is_reported() {
        let err = cede_main_thread(|| panic!("boom"), || {}).unwrap_err();
        assert!(matches!(err, LaunchError::WorkerPanicked));
        assert_eq!(err.exit_code(), 1);
    }
}
