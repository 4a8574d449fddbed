//! Temporary daemon fixtures.
//!
//! A [`TestDaemon`] owns a temp directory holding a daemon control directory
//! and a client directory, plus a [`DaemonHandle`] whose liveness the test
//! flips by hand. Everything is removed when it is dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::TempDir;
use wifictl_core::{ControlDaemon, DaemonHandle};

use crate::peer::FakeCtrlPeer;

pub struct TestDaemon {
    pub handle: Rc<DaemonHandle>,
    ctrl_dir: PathBuf,
    client_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestDaemon {
    /// A stopped daemon named `name` with an empty control directory.
    pub fn new(name: &str) -> io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let ctrl_dir = temp_dir.path().join(name);
        let client_dir = temp_dir.path().join("client");
        std::fs::create_dir(&ctrl_dir)?;
        Ok(Self {
            handle: Rc::new(DaemonHandle::new(name, &ctrl_dir)),
            ctrl_dir,
            client_dir,
            _temp_dir: temp_dir,
        })
    }

    /// Same as [`new`](Self::new), but reported as running.
    pub fn running(name: &str) -> io::Result<Self> {
        let daemon = Self::new(name)?;
        daemon.handle.set_running(true);
        Ok(daemon)
    }

    pub fn ctrl_dir(&self) -> &Path {
        &self.ctrl_dir
    }

    /// Where client sockets should be bound; not created up front.
    pub fn client_dir(&self) -> &Path {
        &self.client_dir
    }

    pub fn set_running(&self, running: bool) {
        self.handle.set_running(running);
    }

    /// Handle as the trait object managers take.
    pub fn daemon(&self) -> Rc<dyn ControlDaemon> {
        self.handle.clone()
    }

    /// Start a fake control socket named `sock` in the control directory.
    pub fn spawn_peer<F>(&self, sock: &str, responder: F) -> io::Result<FakeCtrlPeer>
    where
        F: Fn(&str) -> Vec<Vec<u8>> + Send + 'static,
    {
        FakeCtrlPeer::spawn(&self.ctrl_dir, sock, responder)
    }
}
