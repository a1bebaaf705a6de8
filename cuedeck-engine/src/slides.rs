//! Slide-deck controller seam
//!
//! PowerPoint-style decks are driven by platform automation the engine
//! cannot do itself; an external collaborator supplies the implementation.
//! The engine treats "controller has a presentation open" as the running
//! state of a ppt cue: there is no natural-completion signal, only
//! explicit stop.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Capability interface for the external slide-deck controller
pub trait SlideController: Send + Sync {
    fn open(&self, path: &Path) -> Result<()>;
    fn next(&self) -> Result<()>;
    fn previous(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// Controller that shells out to a configured helper command
/// (`<helper> open <path>`, `<helper> next`, ...).
///
/// The helper wraps whatever platform automation applies (AppleScript,
/// COM, a LibreOffice macro). Invocations are fire-and-forget; a reap task
/// collects the exit status so nothing zombifies.
pub struct CommandSlideController {
    helper: PathBuf,
}

impl CommandSlideController {
    pub fn new(helper: PathBuf) -> Self {
        Self { helper }
    }

    fn run(&self, subcommand: &str, arg: Option<&Path>) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.helper);
        command.arg(subcommand);
        if let Some(arg) = arg {
            command.arg(arg);
        }
        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Spawn(format!("slide helper {}: {}", self.helper.display(), e)))?;
        debug!("Slide helper invoked: {} {}", self.helper.display(), subcommand);

        tokio::spawn(async move {
            if let Ok(status) = child.wait().await {
                if !status.success() {
                    warn!("Slide helper exited with {}", status);
                }
            }
        });
        Ok(())
    }
}

impl SlideController for CommandSlideController {
    fn open(&self, path: &Path) -> Result<()> {
        self.run("open", Some(path))
    }

    fn next(&self) -> Result<()> {
        self.run("next", None)
    }

    fn previous(&self) -> Result<()> {
        self.run("previous", None)
    }

    fn close(&self) -> Result<()> {
        self.run("close", None)
    }
}

/// No-op controller for headless use and tests; records invocations so
/// callers can assert on them.
#[derive(Default)]
pub struct NullSlideController {
    calls: Mutex<Vec<String>>,
}

impl NullSlideController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("slide call log poisoned").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("slide call log poisoned").push(call);
    }
}

impl SlideController for NullSlideController {
    fn open(&self, path: &Path) -> Result<()> {
        self.record(format!("open {}", path.display()));
        Ok(())
    }

    fn next(&self) -> Result<()> {
        self.record("next".to_string());
        Ok(())
    }

    fn previous(&self) -> Result<()> {
        self.record("previous".to_string());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.record("close".to_string());
        Ok(())
    }
}
