//! Process registry
//!
//! Tracks every external process the engine spawns (players, extractors,
//! probes) so that shutdown, orderly or not, leaves nothing behind. The
//! registry is bookkeeping only: runners own their `Child` handles, the
//! registry holds pids. That split lets `terminate_all` reach processes
//! whose owning deck is already gone.
//!
//! Lifecycle: created once at engine start, injected where needed, torn down
//! by [`ShutdownGuard`] which runs `terminate_all` on drop, including a
//! panic unwind of the main task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Token returned by [`ProcessRegistry::register`]; pass it back to
/// `unregister` when the process has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessToken(u64);

#[derive(Debug)]
struct RegisteredProcess {
    pid: u32,
    label: String,
}

/// Registry of live external processes.
///
/// All mutation happens under one lock covering the whole
/// read-modify-write, so registration racing a global shutdown cannot leak
/// an entry. Internals are sync (std Mutex, no await points) so the
/// shutdown path works from `Drop`.
pub struct ProcessRegistry {
    procs: Mutex<HashMap<u64, RegisteredProcess>>,
    next_token: AtomicU64,
    grace: Duration,
}

impl ProcessRegistry {
    /// Create a registry with the given termination grace period
    pub fn new(grace: Duration) -> Self {
        Self {
            procs: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            grace,
        }
    }

    /// Record a spawned process. The label shows up in shutdown logs.
    pub fn register(&self, pid: u32, label: impl Into<String>) -> ProcessToken {
        let token = ProcessToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let label = label.into();
        debug!("Registering process {} (pid {})", label, pid);
        self.procs
            .lock()
            .expect("process registry poisoned")
            .insert(token.0, RegisteredProcess { pid, label });
        token
    }

    /// Drop a process from the registry. Safe to call with a token that was
    /// already removed (e.g. after `terminate_all` beat the monitor to it).
    pub fn unregister(&self, token: ProcessToken) {
        if let Some(entry) = self
            .procs
            .lock()
            .expect("process registry poisoned")
            .remove(&token.0)
        {
            debug!("Unregistered process {} (pid {})", entry.label, entry.pid);
        }
    }

    /// Number of currently registered processes
    pub fn len(&self) -> usize {
        self.procs.lock().expect("process registry poisoned").len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminate every registered process.
    ///
    /// Graceful signal first, then a bounded wait, then force-kill. Safe to
    /// call repeatedly, safe with zero entries, and never fails on handles
    /// that are already dead. This is the only mechanism standing between a
    /// crash and orphaned player windows on the live output, so it escalates
    /// rather than erroring.
    pub fn terminate_all(&self) {
        let entries: Vec<RegisteredProcess> = {
            let mut procs = self.procs.lock().expect("process registry poisoned");
            // Pid 0 marks a handle whose pid was never known; signalling it
            // would hit our own process group
            procs.drain().map(|(_, entry)| entry).filter(|e| e.pid != 0).collect()
        };
        if entries.is_empty() {
            return;
        }

        info!("Terminating {} registered process(es)", entries.len());
        for entry in &entries {
            signal_terminate(entry.pid);
        }

        let deadline = Instant::now() + self.grace;
        let mut remaining: Vec<&RegisteredProcess> = entries.iter().collect();
        while !remaining.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
            remaining.retain(|entry| pid_alive(entry.pid));
        }

        for entry in remaining {
            warn!(
                "Process {} (pid {}) ignored terminate, force-killing",
                entry.label, entry.pid
            );
            signal_kill(entry.pid);
        }
    }
}

/// Guard tying the registry lifetime to a scope.
///
/// Held by `main` for the whole engine lifetime; dropping it (normal return
/// or unwind) runs `terminate_all`.
pub struct ShutdownGuard {
    registry: Arc<ProcessRegistry>,
}

impl ShutdownGuard {
    pub fn new(registry: Arc<ProcessRegistry>) -> Self {
        Self { registry }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.registry.terminate_all();
    }
}

#[cfg(unix)]
pub(crate) fn signal_terminate(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(unix)]
fn signal_kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub(crate) fn signal_terminate(pid: u32) {
    warn!("No pid-level terminate on this platform (pid {})", pid);
}

#[cfg(not(unix))]
fn signal_kill(_pid: u32) {}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}
