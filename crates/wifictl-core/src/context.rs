//! Process-wide control state, passed explicitly to every constructor.
//!
//! A [`CtrlContext`] holds the client socket directory, the reply buffer
//! size, the manager timing, the registered vendor, the link resolver, and
//! the lookup tables that back the interface→manager relation. Tests create
//! one per case so nothing leaks between them.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, info};
use wifictl_config::{AppConfig, limits};

use crate::ctrl::discovery::LinkResolver;
use crate::ctrl::interface::{Interface, InterfaceInner};
use crate::ctrl::manager::{ManagerId, ManagerInner};
use crate::error::CtrlError;
use crate::event_loop::EventLoop;
use crate::vendor::Vendor;

/// Static settings a context is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlSettings {
    pub client_dir: PathBuf,
    pub max_msg_len: usize,
    pub first_delay: Duration,
    pub retry_delay: Duration,
    pub max_connection_attempts: u32,
}

impl Default for CtrlSettings {
    fn default() -> Self {
        Self {
            client_dir: PathBuf::from(limits::DEFAULT_CLIENT_DIR),
            max_msg_len: limits::DEFAULT_MSG_LEN,
            first_delay: Duration::from_millis(limits::FIRST_DELAY_MS),
            retry_delay: Duration::from_millis(limits::RETRY_DELAY_MS),
            max_connection_attempts: limits::MAX_CONNECTION_ATTEMPTS,
        }
    }
}

impl CtrlSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            client_dir: PathBuf::from(&config.ctrl.client_dir),
            max_msg_len: config.ctrl.max_msg_len,
            first_delay: Duration::from_millis(config.manager.first_delay_ms),
            retry_delay: Duration::from_millis(config.manager.retry_delay_ms),
            max_connection_attempts: config.manager.max_connection_attempts,
        }
    }

    /// Default settings with client sockets bound under `client_dir`.
    pub fn with_client_dir(client_dir: impl Into<PathBuf>) -> Self {
        Self {
            client_dir: client_dir.into(),
            ..Self::default()
        }
    }
}

struct ContextInner {
    settings: CtrlSettings,
    // Shared with reader callbacks, which must not keep the context alive.
    max_msg_len: Rc<Cell<usize>>,
    event_loop: EventLoop,
    interfaces: RefCell<Vec<Weak<InterfaceInner>>>,
    managers: RefCell<Vec<(ManagerId, Weak<ManagerInner>)>>,
    next_manager_id: Cell<u64>,
    resolver: RefCell<Option<Rc<dyn LinkResolver>>>,
    vendor: RefCell<Option<Rc<dyn Vendor>>>,
}

/// Cheaply cloneable handle; clones share state.
#[derive(Clone)]
pub struct CtrlContext {
    inner: Rc<ContextInner>,
}

impl std::fmt::Debug for CtrlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtrlContext")
            .field("client_dir", &self.inner.settings.client_dir)
            .field("max_msg_len", &self.max_msg_len())
            .field("managers", &self.inner.managers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl CtrlContext {
    pub fn new(settings: CtrlSettings, event_loop: EventLoop) -> Self {
        let max_msg_len = Rc::new(Cell::new(settings.max_msg_len));
        Self {
            inner: Rc::new(ContextInner {
                settings,
                max_msg_len,
                event_loop,
                interfaces: RefCell::new(Vec::new()),
                managers: RefCell::new(Vec::new()),
                next_manager_id: Cell::new(1),
                resolver: RefCell::new(None),
                vendor: RefCell::new(None),
            }),
        }
    }

    /// Build a context from validated configuration. `[links]` becomes the
    /// link resolver.
    pub fn from_config(config: &AppConfig, event_loop: EventLoop) -> Self {
        let ctx = Self::new(CtrlSettings::from_config(config), event_loop);
        if !config.links.is_empty() {
            let resolver = crate::ctrl::discovery::StaticLinkResolver::new(config.links.clone());
            ctx.set_link_resolver(Some(Rc::new(resolver)));
        }
        ctx
    }

    pub fn settings(&self) -> &CtrlSettings {
        &self.inner.settings
    }

    pub fn client_dir(&self) -> &Path {
        &self.inner.settings.client_dir
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    pub fn max_msg_len(&self) -> usize {
        self.inner.max_msg_len.get()
    }

    /// Change the reply buffer size. Values outside
    /// [`MIN_MSG_LEN`](limits::MIN_MSG_LEN)..=[`MAX_MSG_LEN`](limits::MAX_MSG_LEN)
    /// are rejected and leave the current value untouched.
    pub fn set_max_msg_len(&self, len: usize) -> Result<(), CtrlError> {
        if !(limits::MIN_MSG_LEN..=limits::MAX_MSG_LEN).contains(&len) {
            return Err(CtrlError::InvalidParam(format!(
                "max message length {len} outside [{}, {}]",
                limits::MIN_MSG_LEN,
                limits::MAX_MSG_LEN
            )));
        }
        self.inner.max_msg_len.set(len);
        debug!(len, "max message length updated");
        Ok(())
    }

    pub(crate) fn max_msg_len_cell(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.inner.max_msg_len)
    }

    pub fn first_delay(&self) -> Duration {
        self.inner.settings.first_delay
    }

    pub fn retry_delay(&self) -> Duration {
        self.inner.settings.retry_delay
    }

    pub fn max_connection_attempts(&self) -> u32 {
        self.inner.settings.max_connection_attempts
    }

    // ── Link resolver ──────────────────────────────────────────────────

    pub fn set_link_resolver(&self, resolver: Option<Rc<dyn LinkResolver>>) {
        *self.inner.resolver.borrow_mut() = resolver;
    }

    /// Ask the resolver which logical interface owns `sock_name`.
    pub fn fetch_link_interface_name(&self, sock_name: &str) -> Option<String> {
        let resolver = self.inner.resolver.borrow().clone()?;
        resolver.fetch_link_interface_name(sock_name)
    }

    // ── Vendor ─────────────────────────────────────────────────────────

    /// Register the vendor backend. Only one vendor is active at a time; the
    /// previous one is returned.
    pub fn register_vendor(&self, vendor: Rc<dyn Vendor>) -> Option<Rc<dyn Vendor>> {
        info!(vendor = vendor.name(), "vendor registered");
        self.inner.vendor.borrow_mut().replace(vendor)
    }

    pub fn unregister_vendor(&self) -> Option<Rc<dyn Vendor>> {
        self.inner.vendor.borrow_mut().take()
    }

    pub fn vendor(&self) -> Option<Rc<dyn Vendor>> {
        self.inner.vendor.borrow().clone()
    }

    // ── Known interfaces ───────────────────────────────────────────────

    pub(crate) fn track_interface(&self, iface: &Rc<InterfaceInner>) {
        let mut ifaces = self.inner.interfaces.borrow_mut();
        ifaces.retain(|w| w.strong_count() > 0);
        ifaces.push(Rc::downgrade(iface));
    }

    /// Every live interface created with this context, in creation order.
    pub fn interfaces(&self) -> Vec<Interface> {
        self.inner
            .interfaces
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(Interface::from_inner)
            .collect()
    }

    /// Direct name match against the known interfaces.
    pub fn find_interface(&self, name: &str) -> Option<Interface> {
        self.interfaces().into_iter().find(|i| i.name() == name)
    }

    // ── Manager table ──────────────────────────────────────────────────

    pub(crate) fn allocate_manager_id(&self) -> ManagerId {
        let id = self.inner.next_manager_id.get();
        self.inner.next_manager_id.set(id + 1);
        ManagerId::new(id)
    }

    pub(crate) fn track_manager(&self, id: ManagerId, manager: Weak<ManagerInner>) {
        let mut managers = self.inner.managers.borrow_mut();
        managers.retain(|(_, w)| w.strong_count() > 0);
        managers.push((id, manager));
    }

    pub(crate) fn forget_manager(&self, id: ManagerId) {
        self.inner.managers.borrow_mut().retain(|(m, _)| *m != id);
    }

    pub(crate) fn manager(&self, id: ManagerId) -> Option<Rc<ManagerInner>> {
        self.inner
            .managers
            .borrow()
            .iter()
            .find(|(m, _)| *m == id)
            .and_then(|(_, w)| w.upgrade())
    }
}
