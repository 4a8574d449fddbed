//! A fake daemon control socket.
//!
//! [`FakeCtrlPeer`] binds `<dir>/<sock>` and answers every datagram it
//! receives with the datagrams returned by a scripted responder, sent back to
//! the client's bound path. It runs on its own thread so a blocking
//! synchronous exchange on the test thread sees real socket behaviour.
//! Unsolicited events are injected with [`FakeCtrlPeer::send_to`].

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const RECV_BUF: usize = 65536;

pub struct FakeCtrlPeer {
    path: PathBuf,
    socket: UnixDatagram,
    received: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FakeCtrlPeer {
    /// Bind `<dir>/<sock>` (creating `dir` if needed) and start answering.
    pub fn spawn<F>(dir: impl AsRef<Path>, sock: &str, responder: F) -> io::Result<Self>
    where
        F: Fn(&str) -> Vec<Vec<u8>> + Send + 'static,
    {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(sock);
        let _ = std::fs::remove_file(&path);

        let socket = UnixDatagram::bind(&path)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let worker = socket.try_clone()?;

        let received = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let received = Arc::clone(&received);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || serve(worker, responder, received, stop))
        };

        Ok(Self {
            path,
            socket,
            received,
            stop,
            thread: Some(thread),
        })
    }

    /// Path of the bound server socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commands received so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send an unsolicited datagram to a client socket.
    pub fn send_to(&self, client: impl AsRef<Path>, bytes: &[u8]) -> io::Result<usize> {
        self.socket.send_to(bytes, client)
    }
}

fn serve<F>(
    socket: UnixDatagram,
    responder: F,
    received: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
) where
    F: Fn(&str) -> Vec<Vec<u8>>,
{
    let mut buf = vec![0u8; RECV_BUF];
    while !stop.load(Ordering::Relaxed) {
        let (n, addr) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        let cmd = String::from_utf8_lossy(&buf[..n]).into_owned();
        let replies = responder(&cmd);
        received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cmd);

        // Unbound clients cannot be answered.
        let Some(client) = addr.as_pathname() else {
            continue;
        };
        for reply in replies {
            let _ = socket.send_to(&reply, client);
        }
    }
}

impl Drop for FakeCtrlPeer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        let _ = std::fs::remove_file(&self.path);
    }
}
