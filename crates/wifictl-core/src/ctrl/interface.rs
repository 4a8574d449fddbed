//! A named logical interface bound to one control connection.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, info};

use super::connection::{Connection, EventHandler};
use super::manager::ManagerId;
use crate::context::CtrlContext;
use crate::error::CtrlError;

/// Liveness probe command and its expected reply.
const PING_CMD: &str = "PING";
const PING_REPLY: &str = "PONG";

pub(crate) struct InterfaceInner {
    name: String,
    enabled: Cell<bool>,
    ready: Cell<bool>,
    connection: RefCell<Connection>,
    manager: Cell<Option<ManagerId>>,
}

/// Shared handle to an interface. Clones refer to the same interface;
/// managers only ever hold it weakly.
///
/// `ready` implies `enabled`: readiness is set by a successful
/// [`open`](Self::open) and cleared by [`close`](Self::close) or by disabling.
#[derive(Clone)]
pub struct Interface {
    inner: Rc<InterfaceInner>,
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.inner.name)
            .field("enabled", &self.is_enabled())
            .field("ready", &self.is_ready())
            .field("manager", &self.manager())
            .finish()
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Interface {}

impl Interface {
    /// Create an enabled, not-ready interface whose connection targets
    /// `<server_dir>/<sock_name>`. The interface is recorded in the context's
    /// catalog so discovery can find it by name.
    pub fn new(
        ctx: &CtrlContext,
        name: impl Into<String>,
        conn_id: i32,
        server_dir: impl AsRef<Path>,
        sock_name: &str,
    ) -> Result<Self, CtrlError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CtrlError::InvalidParam("empty interface name".to_string()));
        }
        let connection = Connection::init(ctx, server_dir, sock_name, conn_id)?;
        let inner = Rc::new(InterfaceInner {
            name,
            enabled: Cell::new(true),
            ready: Cell::new(false),
            connection: RefCell::new(connection),
            manager: Cell::new(None),
        });
        ctx.track_interface(&inner);
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Rc<InterfaceInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> WeakInterface {
        WeakInterface(Rc::downgrade(&self.inner))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// Disabling an open interface closes it.
    pub fn enable(&self, enabled: bool) {
        if self.inner.enabled.replace(enabled) == enabled {
            return;
        }
        debug!(iface = %self.inner.name, enabled, "interface enable changed");
        if !enabled {
            self.close();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.get()
    }

    /// Open the connection and mark the interface ready.
    pub fn open(&self) -> Result<(), CtrlError> {
        if !self.is_enabled() {
            return Err(CtrlError::InvalidState(format!(
                "interface {} is disabled",
                self.inner.name
            )));
        }
        self.inner.connection.borrow_mut().open()?;
        if !self.inner.ready.replace(true) {
            info!(iface = %self.inner.name, "interface ready");
        }
        Ok(())
    }

    /// Close the connection and clear readiness.
    pub fn close(&self) {
        self.inner.connection.borrow_mut().close();
        if self.inner.ready.replace(false) {
            info!(iface = %self.inner.name, "interface no longer ready");
        }
    }

    /// Rebind to `<server_dir>/<sock_name>`, e.g. after the daemon renamed the
    /// socket. A changed binding closes the connection first.
    pub fn set_connection_info(
        &self,
        server_dir: impl AsRef<Path>,
        sock_name: &str,
    ) -> Result<(), CtrlError> {
        let server_dir = server_dir.as_ref();
        let mut conn = self.inner.connection.borrow_mut();
        if conn.server_dir() == server_dir && conn.sock_name() == sock_name {
            return Ok(());
        }
        let conn_id = conn.conn_id();
        conn.reinit(server_dir, sock_name, conn_id)?;
        drop(conn);
        self.inner.ready.set(false);
        info!(
            iface = %self.inner.name,
            server = %server_dir.join(sock_name).display(),
            "interface rebound"
        );
        Ok(())
    }

    /// Owning manager, if registered.
    pub fn manager(&self) -> Option<ManagerId> {
        self.inner.manager.get()
    }

    pub(crate) fn set_manager(&self, manager: Option<ManagerId>) {
        self.inner.manager.set(manager);
    }

    pub fn sock_name(&self) -> String {
        self.inner.connection.borrow().sock_name()
    }

    pub fn server_path(&self) -> PathBuf {
        self.inner.connection.borrow().server_path().to_path_buf()
    }

    pub fn client_path(&self) -> PathBuf {
        self.inner.connection.borrow().client_path().to_path_buf()
    }

    /// Route asynchronous events from this interface's socket to `handler`.
    pub fn set_event_handler(&self, handler: Option<EventHandler>) {
        self.inner.connection.borrow_mut().set_event_handler(handler);
    }

    pub fn send_cmd(&self, cmd: &str) -> Result<(), CtrlError> {
        self.inner.connection.borrow().send_cmd(cmd)
    }

    pub fn send_cmd_synced(&self, cmd: &str) -> Result<String, CtrlError> {
        self.inner.connection.borrow().send_cmd_synced(cmd)
    }

    pub fn send_cmd_synced_ext(&self, cmd: &str, timeout: Duration) -> Result<String, CtrlError> {
        self.inner.connection.borrow().send_cmd_synced_ext(cmd, timeout)
    }

    pub fn send_cmd_check_response(&self, cmd: &str, expected: &str) -> Result<(), CtrlError> {
        self.inner
            .connection
            .borrow()
            .send_cmd_check_response(cmd, expected)
    }

    pub fn send_cmd_check_response_ext(
        &self,
        cmd: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<(), CtrlError> {
        self.inner
            .connection
            .borrow()
            .send_cmd_check_response_ext(cmd, expected, timeout)
    }

    /// Probe the daemon with `PING`; true on `PONG`.
    pub fn ping(&self) -> bool {
        match self.send_cmd_check_response(PING_CMD, PING_REPLY) {
            Ok(()) => true,
            Err(e) => {
                debug!(iface = %self.inner.name, error = %e, "ping failed");
                false
            }
        }
    }
}

/// Non-owning reference held by a manager's registry.
#[derive(Clone)]
pub(crate) struct WeakInterface(Weak<InterfaceInner>);

impl WeakInterface {
    pub(crate) fn upgrade(&self) -> Option<Interface> {
        self.0.upgrade().map(Interface::from_inner)
    }

    pub(crate) fn is(&self, iface: &Interface) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&iface.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CtrlSettings;
    use crate::error::ErrorKind;
    use crate::event_loop::EventLoop;
    use tempfile::TempDir;
    use wifictl_test_utils::peer::FakeCtrlPeer;

    fn ctx(tmp: &TempDir) -> CtrlContext {
        CtrlContext::new(
            CtrlSettings::with_client_dir(tmp.path().join("client")),
            EventLoop::new(),
        )
    }

    #[test]
    fn test_new_interface_is_enabled_not_ready() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let iface = Interface::new(&ctx, "wlan0", 0, tmp.path(), "wlan0").unwrap();
        assert!(iface.is_enabled());
        assert!(!iface.is_ready());
        assert_eq!(iface.manager(), None);
        assert_eq!(ctx.find_interface("wlan0"), Some(iface));
    }

    #[test]
    fn test_rejects_empty_name() {
        let tmp = TempDir::new().unwrap();
        let err = Interface::new(&ctx(&tmp), "", 0, tmp.path(), "wlan0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParam);
    }

    #[test]
    fn test_open_sets_ready_close_clears() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let _peer = FakeCtrlPeer::spawn(tmp.path(), "wlan0", |_| vec![b"PONG\n".to_vec()]).unwrap();
        let iface = Interface::new(&ctx, "wlan0", 0, tmp.path(), "wlan0").unwrap();

        iface.open().unwrap();
        assert!(iface.is_ready());
        assert!(iface.ping());

        iface.close();
        assert!(!iface.is_ready());
        assert!(!iface.ping());
    }

    #[test]
    fn test_open_failure_keeps_not_ready() {
        let tmp = TempDir::new().unwrap();
        let iface = Interface::new(&ctx(&tmp), "wlan0", 0, tmp.path(), "wlan0").unwrap();
        assert!(iface.open().is_err());
        assert!(!iface.is_ready());
    }

    #[test]
    fn test_disabled_interface_cannot_open() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let _peer = FakeCtrlPeer::spawn(tmp.path(), "wlan0", |_| vec![]).unwrap();
        let iface = Interface::new(&ctx, "wlan0", 0, tmp.path(), "wlan0").unwrap();
        iface.open().unwrap();

        iface.enable(false);
        assert!(!iface.is_ready());
        assert_eq!(iface.open().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_set_connection_info_rebinds() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let _peer = FakeCtrlPeer::spawn(tmp.path(), "wlan0", |_| vec![]).unwrap();
        let iface = Interface::new(&ctx, "wlan0", 0, tmp.path(), "wlan0").unwrap();
        iface.open().unwrap();

        // Same binding is a no-op.
        iface.set_connection_info(tmp.path(), "wlan0").unwrap();
        assert!(iface.is_ready());

        iface.set_connection_info(tmp.path(), "wlan0.1").unwrap();
        assert!(!iface.is_ready());
        assert_eq!(iface.sock_name(), "wlan0.1");
        assert_eq!(iface.server_path(), tmp.path().join("wlan0.1"));
    }

    #[test]
    fn test_handler_clearing_itself_stops_delivery() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let peer = FakeCtrlPeer::spawn(tmp.path(), "wlan0", |_| vec![]).unwrap();
        let iface = Interface::new(&ctx, "wlan0", 0, tmp.path(), "wlan0").unwrap();

        let calls = Rc::new(Cell::new(0u32));
        let count = Rc::clone(&calls);
        let this = iface.downgrade();
        iface.set_event_handler(Some(Box::new(move |_: &str| {
            count.set(count.get() + 1);
            if let Some(me) = this.upgrade() {
                me.set_event_handler(None);
            }
        })));
        iface.open().unwrap();

        let ev = ctx.event_loop();
        peer.send_to(iface.client_path(), b"<3>AP-ENABLED\n").unwrap();
        ev.run_until(Duration::from_secs(2), || calls.get() == 1).unwrap();
        peer.send_to(iface.client_path(), b"<3>AP-DISABLED\n").unwrap();
        ev.run_until(Duration::from_millis(200), || calls.get() > 1).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_handler_replacing_itself_keeps_replacement() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let peer = FakeCtrlPeer::spawn(tmp.path(), "wlan0", |_| vec![]).unwrap();
        let iface = Interface::new(&ctx, "wlan0", 0, tmp.path(), "wlan0").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let first = Rc::clone(&seen);
        let this = iface.downgrade();
        iface.set_event_handler(Some(Box::new(move |ev: &str| {
            first.borrow_mut().push(format!("first {ev}"));
            let second = Rc::clone(&first);
            if let Some(me) = this.upgrade() {
                me.set_event_handler(Some(Box::new(move |ev: &str| {
                    second.borrow_mut().push(format!("second {ev}"))
                })));
            }
        })));
        iface.open().unwrap();

        let ev = ctx.event_loop();
        peer.send_to(iface.client_path(), b"<3>A\n").unwrap();
        ev.run_until(Duration::from_secs(2), || seen.borrow().len() == 1).unwrap();
        peer.send_to(iface.client_path(), b"<3>B\n").unwrap();
        ev.run_until(Duration::from_secs(2), || seen.borrow().len() == 2).unwrap();
        assert_eq!(*seen.borrow(), vec!["first <3>A".to_string(), "second <3>B".to_string()]);
    }

    #[test]
    fn test_dropped_interface_leaves_catalog() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let iface = Interface::new(&ctx, "wlan0", 0, tmp.path(), "wlan0").unwrap();
        assert_eq!(ctx.interfaces().len(), 1);
        drop(iface);
        assert!(ctx.interfaces().is_empty());
    }
}
