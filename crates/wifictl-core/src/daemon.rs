//! Boundary to the external supplicant / access-point daemon.
//!
//! The manager never talks to the daemon process itself. All it needs is a
//! liveness flag and the directory the daemon creates its control sockets in.

use std::cell::Cell;
use std::path::PathBuf;

/// What a manager needs to know about the daemon it supervises.
pub trait ControlDaemon {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Whether the daemon process is currently up.
    fn is_running(&self) -> bool;

    /// Directory holding one control socket per interface.
    fn ctrl_dir(&self) -> PathBuf;
}

/// A daemon whose liveness is reported by its supervisor.
#[derive(Debug)]
pub struct DaemonHandle {
    name: String,
    ctrl_dir: PathBuf,
    running: Cell<bool>,
}

impl DaemonHandle {
    /// Starts out reported as not running.
    pub fn new(name: impl Into<String>, ctrl_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            ctrl_dir: ctrl_dir.into(),
            running: Cell::new(false),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.set(running);
    }
}

impl ControlDaemon for DaemonHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }

    fn ctrl_dir(&self) -> PathBuf {
        self.ctrl_dir.clone()
    }
}

/// A daemon considered running for as long as its control directory exists.
///
/// Used when nothing supervises the daemon from inside this process, e.g.
/// the `monitor` command attaching to a system hostapd.
#[derive(Debug)]
pub struct CtrlDirDaemon {
    name: String,
    ctrl_dir: PathBuf,
}

impl CtrlDirDaemon {
    pub fn new(name: impl Into<String>, ctrl_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            ctrl_dir: ctrl_dir.into(),
        }
    }
}

impl ControlDaemon for CtrlDirDaemon {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_running(&self) -> bool {
        self.ctrl_dir.is_dir()
    }

    fn ctrl_dir(&self) -> PathBuf {
        self.ctrl_dir.clone()
    }
}
