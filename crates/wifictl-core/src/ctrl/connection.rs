//! Client side of one daemon control socket.
//!
//! A [`Connection`] owns a Unix datagram socket bound to a private client
//! path and default-peered to the daemon's per-interface server socket.
//! Commands and their replies share that socket with unsolicited event
//! datagrams:
//!
//! ```text
//!  client_dir/<sock>-<id>                       server_dir/<sock>
//! ┌──────────────────────┐   "STATUS"          ┌──────────────────┐
//! │      Connection      │ ──────────────────▶ │  hostapd / wpa_s │
//! │                      │ ◀────────────────── │                  │
//! └──────────────────────┘  "<3>AP-ENABLED\n"  └──────────────────┘
//!                           "state=ENABLED\n"
//! ```
//!
//! Outside a synchronous exchange, datagrams are delivered to the event
//! handler from the [`EventLoop`](crate::event_loop::EventLoop). During a
//! synchronous exchange the caller blocks in poll(2) and events that arrive
//! before the reply are dropped.

use std::cell::{Cell, RefCell};
use std::io::ErrorKind;
use std::os::fd::AsFd;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use tracing::{debug, info, trace, warn};
use wifictl_config::limits;

use crate::context::CtrlContext;
use crate::error::CtrlError;
use crate::event_loop::{SourceId, wait_readable};

/// Default budget for synchronous commands, and the floor for any shorter request.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_millis(limits::DEFAULT_CMD_TIMEOUT_MS);

/// First byte of a priority-tagged event (`"<3>CTRL-EVENT-..."`).
const EVENT_PRIORITY_MARKER: u8 = b'<';

/// Prefix of an interface-tagged event (`"IFNAME=wlan0 <3>..."`).
const IFNAME_TAG: &[u8] = b"IFNAME=";

/// Callback for asynchronously received datagrams. Receives the datagram
/// text with one trailing line-feed removed.
pub type EventHandler = Box<dyn FnMut(&str)>;

/// The current handler plus a counter bumped on every replacement, so the
/// reader can tell whether a handler replaced or cleared itself mid-call.
#[derive(Default)]
struct HandlerSlot {
    handler: RefCell<Option<EventHandler>>,
    generation: Cell<u64>,
}

impl HandlerSlot {
    fn set(&self, handler: Option<EventHandler>) {
        *self.handler.borrow_mut() = handler;
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    fn deliver(&self, text: &str) {
        let generation = self.generation.get();
        let taken = self.handler.borrow_mut().take();
        if let Some(mut f) = taken {
            f(text);
            // Put it back unless the call installed or cleared a handler.
            if self.generation.get() == generation {
                *self.handler.borrow_mut() = Some(f);
            }
        }
    }
}

/// Whether a datagram is an unsolicited event rather than a command reply.
pub fn is_event(msg: &[u8]) -> bool {
    msg.first() == Some(&EVENT_PRIORITY_MARKER)
        || (msg.starts_with(IFNAME_TAG) && msg.len() > IFNAME_TAG.len())
}

fn strip_line_feed(msg: &[u8]) -> &[u8] {
    msg.strip_suffix(b"\n").unwrap_or(msg)
}

/// One client control socket. See the [module docs](self).
pub struct Connection {
    ctx: CtrlContext,
    conn_id: i32,
    client_path: PathBuf,
    server_path: PathBuf,
    socket: Option<Rc<UnixDatagram>>,
    reader: Option<SourceId>,
    handler: Rc<HandlerSlot>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("client_path", &self.client_path)
            .field("server_path", &self.server_path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Connection {
    /// Prepare a connection to `<server_dir>/<sock_name>`, bound locally at
    /// `<client_dir>/<sock_name>-<conn_id>`. No socket is created yet.
    pub fn init(
        ctx: &CtrlContext,
        server_dir: impl AsRef<Path>,
        sock_name: &str,
        conn_id: i32,
    ) -> Result<Self, CtrlError> {
        let (client_path, server_path) = derive_paths(ctx, server_dir.as_ref(), sock_name, conn_id)?;
        Ok(Self {
            ctx: ctx.clone(),
            conn_id,
            client_path,
            server_path,
            socket: None,
            reader: None,
            handler: Rc::default(),
        })
    }

    /// Point this connection at another socket. An open connection is closed
    /// first; the event handler is kept.
    pub fn reinit(
        &mut self,
        server_dir: impl AsRef<Path>,
        sock_name: &str,
        conn_id: i32,
    ) -> Result<(), CtrlError> {
        let (client_path, server_path) =
            derive_paths(&self.ctx, server_dir.as_ref(), sock_name, conn_id)?;
        self.close();
        self.conn_id = conn_id;
        self.client_path = client_path;
        self.server_path = server_path;
        Ok(())
    }

    /// Replace the event handler. `None` stops delivery; datagrams are still
    /// drained from the socket.
    pub fn set_event_handler(&mut self, handler: Option<EventHandler>) {
        self.handler.set(handler);
    }

    pub fn client_path(&self) -> &Path {
        &self.client_path
    }

    pub fn server_path(&self) -> &Path {
        &self.server_path
    }

    /// Directory holding the server socket.
    pub fn server_dir(&self) -> &Path {
        self.server_path.parent().unwrap_or(Path::new(""))
    }

    /// Basename of the server path.
    pub fn sock_name(&self) -> String {
        self.server_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn conn_id(&self) -> i32 {
        self.conn_id
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Bind, peer, and register with the event loop. Succeeds immediately if
    /// already open. On failure the connection is left closed.
    pub fn open(&mut self) -> Result<(), CtrlError> {
        if self.is_open() {
            return Ok(());
        }

        let socket = Rc::new(self.bind_client()?);
        self.socket = Some(Rc::clone(&socket));

        if let Err(e) = self.attach(&socket) {
            warn!(server = %self.server_path.display(), error = %e, "failed to open control socket");
            self.close();
            return Err(e);
        }

        info!(
            client = %self.client_path.display(),
            server = %self.server_path.display(),
            "control socket open"
        );
        Ok(())
    }

    fn bind_client(&self) -> Result<UnixDatagram, CtrlError> {
        if let Some(dir) = self.client_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| CtrlError::io("create client dir", dir, e))?;
        }

        match UnixDatagram::bind(&self.client_path) {
            Ok(socket) => Ok(socket),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                // Left behind by an earlier run that never closed.
                debug!(path = %self.client_path.display(), "removing stale client socket");
                let _ = std::fs::remove_file(&self.client_path);
                UnixDatagram::bind(&self.client_path)
                    .map_err(|e| CtrlError::io("bind", &self.client_path, e))
            }
            Err(e) => Err(CtrlError::io("bind", &self.client_path, e)),
        }
    }

    fn attach(&mut self, socket: &Rc<UnixDatagram>) -> Result<(), CtrlError> {
        socket
            .set_nonblocking(true)
            .map_err(|e| CtrlError::io("set non-blocking", &self.client_path, e))?;
        socket
            .connect(&self.server_path)
            .map_err(|e| CtrlError::io("connect", &self.server_path, e))?;

        let sock = Rc::clone(socket);
        let handler = Rc::clone(&self.handler);
        let max_len = self.ctx.max_msg_len_cell();
        let server = self.server_path.clone();
        let id = self
            .ctx
            .event_loop()
            .add_reader(Rc::clone(socket) as Rc<dyn AsFd>, move || {
                pump_events(&sock, &handler, &max_len, &server)
            });
        self.reader = Some(id);
        Ok(())
    }

    /// Send `cmd` as one datagram without waiting for a reply.
    pub fn send_cmd(&self, cmd: &str) -> Result<(), CtrlError> {
        let socket = self.socket()?;
        self.send_on(socket, cmd)
    }

    fn send_on(&self, socket: &UnixDatagram, cmd: &str) -> Result<(), CtrlError> {
        if cmd.is_empty() {
            return Err(CtrlError::InvalidParam("empty command".to_string()));
        }
        match socket.send(cmd.as_bytes()) {
            Ok(sent) if sent == cmd.len() => {
                trace!(server = %self.server_path.display(), cmd, "command sent");
                Ok(())
            }
            Ok(sent) => {
                warn!(server = %self.server_path.display(), cmd, sent, "short write");
                Err(CtrlError::ShortWrite {
                    path: self.server_path.clone(),
                    sent,
                    len: cmd.len(),
                })
            }
            Err(e) => {
                warn!(server = %self.server_path.display(), cmd, error = %e, "send failed");
                Err(CtrlError::io("send", &self.server_path, e))
            }
        }
    }

    /// [`send_cmd_synced_ext`](Self::send_cmd_synced_ext) with the default timeout.
    pub fn send_cmd_synced(&self, cmd: &str) -> Result<String, CtrlError> {
        self.send_cmd_synced_ext(cmd, DEFAULT_CMD_TIMEOUT)
    }

    /// Send `cmd` and block until its reply arrives or `timeout` elapses.
    ///
    /// Any datagrams already queued are discarded first, so a late reply to an
    /// earlier timed-out command cannot be mistaken for this one. Event
    /// datagrams received while waiting are dropped. `timeout` is raised to
    /// [`DEFAULT_CMD_TIMEOUT`] if shorter. The reply is truncated to the
    /// configured message length minus one and loses one trailing line-feed.
    pub fn send_cmd_synced_ext(&self, cmd: &str, timeout: Duration) -> Result<String, CtrlError> {
        let socket = self.socket()?;
        let budget = timeout.max(DEFAULT_CMD_TIMEOUT);
        let mut buf = vec![0u8; self.ctx.max_msg_len()];

        self.drain(socket, &mut buf);
        self.send_on(socket, cmd)?;

        let capacity = buf.len() - 1;
        let started = Instant::now();
        loop {
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(self.timeout_error(cmd, budget));
            }

            match wait_readable(std::iter::once(socket as &dyn AsFd), remaining) {
                Ok(ready) if ready.first() == Some(&true) => {}
                // Nothing yet; the loop decides whether the budget is spent.
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!(server = %self.server_path.display(), cmd, error = %e, "wait for reply failed");
                    return Err(CtrlError::Poll(e));
                }
            }

            let len = match socket.recv(&mut buf[..capacity]) {
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => {
                    warn!(server = %self.server_path.display(), cmd, error = %e, "recv failed");
                    return Err(CtrlError::io("recv", &self.server_path, e));
                }
            };

            let msg = &buf[..len];
            if is_event(msg) {
                debug!(
                    server = %self.server_path.display(),
                    event = %String::from_utf8_lossy(strip_line_feed(msg)),
                    "dropping event while waiting for reply"
                );
                continue;
            }

            let reply = String::from_utf8_lossy(strip_line_feed(msg)).into_owned();
            trace!(server = %self.server_path.display(), cmd, reply, "reply received");
            return Ok(reply);
        }
    }

    /// [`send_cmd_check_response_ext`](Self::send_cmd_check_response_ext) with the default timeout.
    pub fn send_cmd_check_response(&self, cmd: &str, expected: &str) -> Result<(), CtrlError> {
        self.send_cmd_check_response_ext(cmd, expected, DEFAULT_CMD_TIMEOUT)
    }

    /// Send `cmd` synchronously and require the reply to equal `expected`.
    pub fn send_cmd_check_response_ext(
        &self,
        cmd: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<(), CtrlError> {
        let reply = self.send_cmd_synced_ext(cmd, timeout)?;
        if reply != expected {
            debug!(server = %self.server_path.display(), cmd, expected, reply, "unexpected reply");
            return Err(CtrlError::ResponseMismatch {
                cmd: cmd.to_string(),
                expected: expected.to_string(),
                got: reply,
            });
        }
        Ok(())
    }

    /// Deregister, release the socket, and unlink the client path. Does
    /// nothing if the connection is not open.
    pub fn close(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        if let Some(id) = self.reader.take() {
            self.ctx.event_loop().remove_reader(id);
        }
        drop(socket);

        if let Err(e) = std::fs::remove_file(&self.client_path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.client_path.display(), error = %e, "failed to unlink client socket");
            }
        }
        info!(server = %self.server_path.display(), "control socket closed");
    }

    /// Close and release the connection.
    pub fn cleanup(mut self) {
        self.close();
    }

    fn socket(&self) -> Result<&UnixDatagram, CtrlError> {
        self.socket.as_deref().ok_or_else(|| {
            CtrlError::InvalidState(format!(
                "control socket {} is not open",
                self.server_path.display()
            ))
        })
    }

    fn drain(&self, socket: &UnixDatagram, buf: &mut [u8]) {
        loop {
            match socket.recv(buf) {
                Ok(len) => debug!(
                    server = %self.server_path.display(),
                    stale = %String::from_utf8_lossy(strip_line_feed(&buf[..len])),
                    "discarding stale datagram"
                ),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(server = %self.server_path.display(), error = %e, "drain stopped");
                    break;
                }
            }
        }
    }

    fn timeout_error(&self, cmd: &str, timeout: Duration) -> CtrlError {
        warn!(server = %self.server_path.display(), cmd, ?timeout, "command timed out");
        CtrlError::Timeout {
            cmd: cmd.to_string(),
            path: self.server_path.clone(),
            timeout,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn derive_paths(
    ctx: &CtrlContext,
    server_dir: &Path,
    sock_name: &str,
    conn_id: i32,
) -> Result<(PathBuf, PathBuf), CtrlError> {
    if server_dir.as_os_str().is_empty() {
        return Err(CtrlError::InvalidParam("empty server directory".to_string()));
    }
    if sock_name.is_empty() {
        return Err(CtrlError::InvalidParam("empty socket name".to_string()));
    }
    let client_path = ctx.client_dir().join(format!("{sock_name}-{conn_id}"));
    let server_path = server_dir.join(sock_name);
    Ok((client_path, server_path))
}

/// Reader callback: deliver every queued datagram to the handler.
fn pump_events(socket: &UnixDatagram, handler: &HandlerSlot, max_len: &Cell<usize>, server: &Path) {
    let mut buf = vec![0u8; max_len.get()];
    let capacity = buf.len() - 1;
    loop {
        let len = match socket.recv(&mut buf[..capacity]) {
            Ok(len) => len,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!(server = %server.display(), error = %e, "event recv failed");
                return;
            }
        };
        let text = String::from_utf8_lossy(strip_line_feed(&buf[..len])).into_owned();
        trace!(server = %server.display(), event = %text, "event received");

        handler.deliver(&text);
    }
}
