//! Supervises the control connections of one external daemon.
//!
//! A [`Manager`] keeps an ordered, non-owning registry of [`Interface`]s and
//! a periodic reconnect timer on the context's event loop. [`Manager::connect`]
//! arms the timer; every tick scans the daemon's control directory, opens
//! interfaces whose sockets appeared, and re-evaluates readiness. Once every
//! enabled interface is ready the timer stops and the ready handler fires
//! once for that connection cycle. If readiness is not reached within
//! `max_connection_attempts` ticks the manager stops retrying without
//! notification; callers observe this as `is_ready()` staying false.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use super::discovery::{self, DiscoveryReport};
use super::interface::{Interface, WeakInterface};
use crate::context::CtrlContext;
use crate::daemon::ControlDaemon;
use crate::error::CtrlError;
use crate::event_loop::{TimerId, TimerState};

/// Identifies a manager inside its context. Interfaces refer to their owner
/// through this id rather than a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId(u64);

impl ManagerId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mgr#{}", self.0)
    }
}

/// Delivered to the ready handler when a connection cycle completes.
#[derive(Debug, Clone)]
pub struct ReadyEvent {
    pub manager: ManagerId,
    /// First ready interface, or the first registered one.
    pub source: Interface,
    pub ready: usize,
    pub enabled: usize,
}

pub type ReadyHandler = Rc<dyn Fn(&ReadyEvent)>;

/// Result of evaluating readiness during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    /// Some enabled interface is still not ready.
    Continue,
    /// Every enabled interface is ready.
    Done,
}

pub(crate) struct ManagerInner {
    id: ManagerId,
    ctx: CtrlContext,
    daemon: RefCell<Rc<dyn ControlDaemon>>,
    interfaces: RefCell<Vec<WeakInterface>>,
    attempts: Cell<u32>,
    timer: TimerId,
    ready_handler: RefCell<Option<ReadyHandler>>,
}

/// See the [module docs](self).
pub struct Manager {
    inner: Rc<ManagerInner>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("id", &self.inner.id)
            .field("daemon", &self.inner.daemon().name().to_string())
            .field("interfaces", &self.count_interfaces())
            .field("attempts", &self.connect_attempts())
            .finish()
    }
}

impl Manager {
    /// Create a manager bound to `daemon`, with a stopped reconnect timer.
    pub fn new(ctx: &CtrlContext, daemon: Rc<dyn ControlDaemon>) -> Self {
        let id = ctx.allocate_manager_id();
        let inner = Rc::new_cyclic(|weak: &Weak<ManagerInner>| {
            let weak = weak.clone();
            let timer = ctx.event_loop().add_timer(ctx.retry_delay(), move || {
                if let Some(manager) = weak.upgrade() {
                    manager.tick();
                }
            });
            ManagerInner {
                id,
                ctx: ctx.clone(),
                daemon: RefCell::new(daemon),
                interfaces: RefCell::new(Vec::new()),
                attempts: Cell::new(0),
                timer,
                ready_handler: RefCell::new(None),
            }
        });
        ctx.track_manager(id, Rc::downgrade(&inner));
        debug!(manager = %id, daemon = inner.daemon().name(), "manager created");
        Self { inner }
    }

    /// Drop every registration and rebind to another daemon.
    pub fn reset(&self, daemon: Rc<dyn ControlDaemon>) {
        self.inner.disconnect();
        self.inner.unregister_all();
        *self.inner.daemon.borrow_mut() = daemon;
    }

    pub fn id(&self) -> ManagerId {
        self.inner.id
    }

    pub fn daemon(&self) -> Rc<dyn ControlDaemon> {
        self.inner.daemon()
    }

    pub fn set_ready_handler(&self, handler: Option<ReadyHandler>) {
        *self.inner.ready_handler.borrow_mut() = handler;
    }

    pub fn ready_handler(&self) -> Option<ReadyHandler> {
        self.inner.ready_handler.borrow().clone()
    }

    /// Add `iface` to the registry. Returns `false` if it was already
    /// registered here. An interface registered with another manager is
    /// moved out of that manager's registry.
    pub fn register_interface(&self, iface: &Interface) -> bool {
        self.inner.register(iface)
    }

    /// Remove `iface` from the registry and clear its back-reference.
    /// Returns `false` if it was not registered.
    pub fn unregister_interface(&self, iface: &Interface) -> bool {
        self.inner.unregister(iface)
    }

    pub fn count_interfaces(&self) -> usize {
        self.inner.interfaces().len()
    }

    pub fn count_enabled_interfaces(&self) -> usize {
        self.inner.count_enabled()
    }

    pub fn count_ready_interfaces(&self) -> usize {
        self.inner.count_ready()
    }

    /// Interface at `pos` in registration order.
    pub fn interface(&self, pos: usize) -> Option<Interface> {
        self.inner.interfaces().into_iter().nth(pos)
    }

    pub fn interface_by_name(&self, name: &str) -> Option<Interface> {
        self.inner.interfaces().into_iter().find(|i| i.name() == name)
    }

    pub fn interfaces(&self) -> Vec<Interface> {
        self.inner.interfaces()
    }

    pub fn first_interface(&self) -> Option<Interface> {
        self.inner.interfaces().into_iter().next()
    }

    pub fn first_ready_interface(&self) -> Option<Interface> {
        self.inner.first_ready()
    }

    /// First interface that is enabled but not ready.
    pub fn first_not_ready_interface(&self) -> Option<Interface> {
        self.inner
            .interfaces()
            .into_iter()
            .find(|i| i.is_enabled() && !i.is_ready())
    }

    /// True when at least one interface is registered and all of them are
    /// ready. Unlike the reconnect tick, disabled interfaces count against
    /// readiness here.
    pub fn is_ready(&self) -> bool {
        let ifaces = self.inner.interfaces();
        !ifaces.is_empty() && ifaces.iter().all(Interface::is_ready)
    }

    /// Daemon running and at least one interface ready.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Ping through the first ready interface.
    pub fn ping(&self) -> bool {
        self.inner.first_ready().is_some_and(|i| i.ping())
    }

    /// Start a connection cycle: the first tick runs after `first_delay`, then
    /// every `retry_delay`. Does nothing if already connected.
    pub fn connect(&self) {
        if self.inner.is_connected() {
            debug!(manager = %self.inner.id, "already connected");
            return;
        }
        self.inner.attempts.set(0);
        self.inner
            .ctx
            .event_loop()
            .arm_timer(self.inner.timer, self.inner.ctx.first_delay());
        info!(
            manager = %self.inner.id,
            daemon = self.inner.daemon().name(),
            "connecting"
        );
    }

    /// Stop retrying and close every interface. Registrations are kept.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Scan the daemon's control directory once, opening registered
    /// interfaces whose sockets are present.
    pub fn discover(&self) -> Result<DiscoveryReport, CtrlError> {
        discovery::scan(&self.inner.ctx, &self.inner)
    }

    /// Run one reconnect tick now. The ready handler only fires while a
    /// connection cycle started by [`connect`](Self::connect) is running.
    pub fn tick(&self) {
        self.inner.tick();
    }

    pub fn connect_attempts(&self) -> u32 {
        self.inner.attempts.get()
    }

    pub fn timer_state(&self) -> TimerState {
        self.inner
            .ctx
            .event_loop()
            .timer_state(self.inner.timer)
            .unwrap_or(TimerState::Stopped)
    }

    /// Disconnect, unregister every interface, and delete the timer.
    pub fn cleanup(self) {
        drop(self);
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.inner.disconnect();
        self.inner.unregister_all();
        self.inner.ctx.event_loop().remove_timer(self.inner.timer);
        self.inner.ctx.forget_manager(self.inner.id);
        debug!(manager = %self.inner.id, "manager cleaned up");
    }
}

impl ManagerInner {
    pub(crate) fn id(&self) -> ManagerId {
        self.id
    }

    pub(crate) fn daemon(&self) -> Rc<dyn ControlDaemon> {
        Rc::clone(&self.daemon.borrow())
    }

    /// Live registered interfaces in registration order. Dropped interfaces
    /// are pruned.
    fn interfaces(&self) -> Vec<Interface> {
        let mut registry = self.interfaces.borrow_mut();
        let mut live = Vec::with_capacity(registry.len());
        registry.retain(|w| match w.upgrade() {
            Some(iface) => {
                live.push(iface);
                true
            }
            None => false,
        });
        live
    }

    /// Registered interface called `name`, if any.
    pub(super) fn registered(&self, name: &str) -> Option<Interface> {
        self.interfaces().into_iter().find(|i| i.name() == name)
    }

    fn contains(&self, iface: &Interface) -> bool {
        self.interfaces.borrow().iter().any(|w| w.is(iface))
    }

    fn register(&self, iface: &Interface) -> bool {
        if self.contains(iface) {
            return false;
        }
        if let Some(previous) = iface.manager().filter(|m| *m != self.id) {
            if let Some(other) = self.ctx.manager(previous) {
                other.interfaces.borrow_mut().retain(|w| !w.is(iface));
            }
        }
        self.interfaces.borrow_mut().push(iface.downgrade());
        iface.set_manager(Some(self.id));
        debug!(manager = %self.id, iface = iface.name(), "interface registered");
        true
    }

    fn unregister(&self, iface: &Interface) -> bool {
        if !self.contains(iface) {
            return false;
        }
        self.interfaces.borrow_mut().retain(|w| !w.is(iface));
        if iface.manager() == Some(self.id) {
            iface.set_manager(None);
        }
        debug!(manager = %self.id, iface = iface.name(), "interface unregistered");
        true
    }

    fn unregister_all(&self) {
        for iface in self.interfaces() {
            iface.close();
            if iface.manager() == Some(self.id) {
                iface.set_manager(None);
            }
        }
        self.interfaces.borrow_mut().clear();
    }

    fn count_enabled(&self) -> usize {
        self.interfaces().iter().filter(|i| i.is_enabled()).count()
    }

    fn count_ready(&self) -> usize {
        self.interfaces().iter().filter(|i| i.is_ready()).count()
    }

    fn first_ready(&self) -> Option<Interface> {
        self.interfaces().into_iter().find(Interface::is_ready)
    }

    fn is_connected(&self) -> bool {
        self.daemon().is_running() && self.count_ready() > 0
    }

    fn stop_timer(&self) {
        self.ctx.event_loop().stop_timer(self.timer);
    }

    fn disconnect(&self) {
        self.attempts.set(0);
        self.stop_timer();
        for iface in self.interfaces() {
            iface.close();
        }
    }

    fn tick(&self) {
        let daemon = self.daemon();
        if let Err(e) = discovery::scan(&self.ctx, self) {
            warn!(manager = %self.id, daemon = daemon.name(), error = %e, "discovery failed");
            return;
        }

        let max = self.ctx.max_connection_attempts();
        if !daemon.is_running() {
            self.attempts.set(max);
            self.stop_timer();
            info!(
                manager = %self.id,
                daemon = daemon.name(),
                "daemon not running, giving up for now"
            );
            return;
        }

        if self.check_connection() == TickOutcome::Continue {
            self.attempts.set(self.attempts.get() + 1);
        }

        let attempts = self.attempts.get();
        if attempts == 0 {
            return;
        }
        if attempts >= max {
            self.attempts.set(0);
            self.stop_timer();
            warn!(
                manager = %self.id,
                daemon = daemon.name(),
                attempts,
                "interfaces not ready, giving up"
            );
        } else {
            debug!(manager = %self.id, attempts, max, "interfaces not ready yet");
        }
    }

    /// Readiness here means every *enabled* interface is ready, so a
    /// registered but disabled interface does not hold the cycle open.
    fn check_connection(&self) -> TickOutcome {
        let ready = self.count_ready();
        let enabled = self.count_enabled();
        if ready < enabled || ready == 0 {
            return TickOutcome::Continue;
        }

        let running =
            self.ctx.event_loop().timer_state(self.timer) == Some(TimerState::Running);
        if running {
            self.attempts.set(0);
            self.stop_timer();
            if enabled > 0 {
                self.notify_ready(ready, enabled);
            }
        }
        TickOutcome::Done
    }

    fn notify_ready(&self, ready: usize, enabled: usize) {
        let Some(source) = self.first_ready().or_else(|| self.interfaces().into_iter().next())
        else {
            return;
        };
        info!(manager = %self.id, source = source.name(), ready, enabled, "all interfaces ready");

        // Cloned out so the handler may call back into the manager.
        let handler = self.ready_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(&ReadyEvent {
                manager: self.id,
                source,
                ready,
                enabled,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CtrlSettings;
    use crate::daemon::DaemonHandle;
    use crate::event_loop::EventLoop;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;
    use wifictl_test_utils::peer::FakeCtrlPeer;

    struct Fixture {
        ctx: CtrlContext,
        daemon: Rc<DaemonHandle>,
        tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            std::fs::create_dir(tmp.path().join("ctrl")).unwrap();
            let settings = CtrlSettings {
                first_delay: Duration::from_millis(1),
                retry_delay: Duration::from_millis(5),
                max_connection_attempts: 3,
                ..CtrlSettings::with_client_dir(tmp.path().join("client"))
            };
            let ctx = CtrlContext::new(settings, EventLoop::new());
            let daemon = Rc::new(DaemonHandle::new("hostapd", tmp.path().join("ctrl")));
            Self { ctx, daemon, tmp }
        }

        fn ctrl_dir(&self) -> std::path::PathBuf {
            self.tmp.path().join("ctrl")
        }

        fn manager(&self) -> Manager {
            Manager::new(&self.ctx, self.daemon.clone())
        }

        fn iface(&self, name: &str) -> Interface {
            Interface::new(&self.ctx, name, 0, self.ctrl_dir(), name).unwrap()
        }
    }

    #[test]
    fn test_register_is_set_like_and_ordered() {
        let f = Fixture::new();
        let mgr = f.manager();
        let (a, b) = (f.iface("wlan0"), f.iface("wlan1"));

        assert!(mgr.register_interface(&a));
        assert!(mgr.register_interface(&b));
        assert!(!mgr.register_interface(&a));
        assert_eq!(mgr.count_interfaces(), 2);
        assert_eq!(mgr.interface(0), Some(a.clone()));
        assert_eq!(mgr.interface(1), Some(b.clone()));
        assert_eq!(mgr.interface(2), None);
        assert_eq!(mgr.first_interface(), Some(a.clone()));
        assert_eq!(mgr.interface_by_name("wlan1"), Some(b.clone()));
        assert_eq!(a.manager(), Some(mgr.id()));

        assert!(mgr.unregister_interface(&a));
        assert!(!mgr.unregister_interface(&a));
        assert_eq!(a.manager(), None);
        assert_eq!(mgr.first_interface(), Some(b));
    }

    #[test]
    fn test_register_moves_between_managers() {
        let f = Fixture::new();
        let first = f.manager();
        let second = f.manager();
        let iface = f.iface("wlan0");

        first.register_interface(&iface);
        second.register_interface(&iface);
        assert_eq!(first.count_interfaces(), 0);
        assert_eq!(second.count_interfaces(), 1);
        assert_eq!(iface.manager(), Some(second.id()));
    }

    #[test]
    fn test_dropped_interface_pruned() {
        let f = Fixture::new();
        let mgr = f.manager();
        let iface = f.iface("wlan0");
        mgr.register_interface(&iface);
        drop(iface);
        assert_eq!(mgr.count_interfaces(), 0);
        assert!(!mgr.is_ready());
    }

    #[test]
    fn test_readiness_counts() {
        let f = Fixture::new();
        let _p0 = FakeCtrlPeer::spawn(f.ctrl_dir(), "wlan0", |_| vec![]).unwrap();
        let _p1 = FakeCtrlPeer::spawn(f.ctrl_dir(), "wlan1", |_| vec![]).unwrap();
        let mgr = f.manager();
        let (a, b) = (f.iface("wlan0"), f.iface("wlan1"));
        assert!(!mgr.is_ready());

        mgr.register_interface(&a);
        mgr.register_interface(&b);
        assert!(!mgr.is_ready());
        assert_eq!(mgr.count_ready_interfaces(), 0);
        assert_eq!(mgr.count_enabled_interfaces(), 2);
        assert_eq!(mgr.first_not_ready_interface(), Some(a.clone()));

        a.open().unwrap();
        assert!(!mgr.is_ready());
        assert_eq!(mgr.first_ready_interface(), Some(a.clone()));
        assert_eq!(mgr.first_not_ready_interface(), Some(b.clone()));

        b.open().unwrap();
        assert!(mgr.is_ready());
        assert_eq!(mgr.count_ready_interfaces(), 2);
        assert_eq!(mgr.first_not_ready_interface(), None);
    }

    #[test]
    fn test_is_connected_needs_running_daemon() {
        let f = Fixture::new();
        let _p0 = FakeCtrlPeer::spawn(f.ctrl_dir(), "wlan0", |_| vec![b"PONG\n".to_vec()]).unwrap();
        let mgr = f.manager();
        let iface = f.iface("wlan0");
        mgr.register_interface(&iface);
        iface.open().unwrap();

        assert!(!mgr.is_connected());
        f.daemon.set_running(true);
        assert!(mgr.is_connected());
        assert!(mgr.ping());
    }

    #[test]
    fn test_ping_without_ready_interface() {
        let f = Fixture::new();
        let mgr = f.manager();
        mgr.register_interface(&f.iface("wlan0"));
        assert!(!mgr.ping());
    }

    #[test]
    fn test_daemon_not_running_gives_up_after_one_tick() {
        let f = Fixture::new();
        let mgr = f.manager();
        let iface = f.iface("wlan0");
        mgr.register_interface(&iface);

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        mgr.set_ready_handler(Some(Rc::new(move |_| flag.set(true))));

        mgr.connect();
        assert_eq!(mgr.timer_state(), TimerState::Armed);

        let ev = f.ctx.event_loop();
        ev.run_until(Duration::from_secs(1), || mgr.timer_state() == TimerState::Stopped)
            .unwrap();

        assert_eq!(mgr.timer_state(), TimerState::Stopped);
        assert_eq!(mgr.connect_attempts(), f.ctx.max_connection_attempts());
        assert!(!fired.get());
    }

    #[test]
    fn test_discovery_failure_leaves_cycle_running() {
        let f = Fixture::new();
        let not_a_dir = f.tmp.path().join("not-a-dir");
        std::fs::write(&not_a_dir, b"").unwrap();
        let daemon = Rc::new(DaemonHandle::new("hostapd", &not_a_dir));
        daemon.set_running(true);
        let mgr = Manager::new(&f.ctx, daemon);
        let iface = f.iface("wlan0");
        mgr.register_interface(&iface);

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        mgr.set_ready_handler(Some(Rc::new(move |_| flag.set(true))));

        mgr.connect();
        f.ctx
            .event_loop()
            .run_until(Duration::from_millis(50), || false)
            .unwrap();

        // Every tick bails out before touching the counter.
        assert_eq!(mgr.connect_attempts(), 0);
        assert_eq!(mgr.timer_state(), TimerState::Running);
        assert!(!fired.get());
        assert!(!iface.is_ready());
    }

    #[test]
    fn test_connect_reaches_ready_and_notifies_once() {
        let f = Fixture::new();
        f.daemon.set_running(true);
        let _p0 = FakeCtrlPeer::spawn(f.ctrl_dir(), "wlan0", |_| vec![]).unwrap();
        let _p1 = FakeCtrlPeer::spawn(f.ctrl_dir(), "wlan1", |_| vec![]).unwrap();
        let mgr = f.manager();
        let (a, b) = (f.iface("wlan0"), f.iface("wlan1"));
        mgr.register_interface(&a);
        mgr.register_interface(&b);

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        mgr.set_ready_handler(Some(Rc::new(move |ev: &ReadyEvent| {
            sink.borrow_mut().push((ev.source.name().to_string(), ev.ready, ev.enabled))
        })));
        assert!(mgr.ready_handler().is_some());

        mgr.connect();
        let ev = f.ctx.event_loop();
        let ready = ev
            .run_until(Duration::from_secs(2), || !events.borrow().is_empty())
            .unwrap();
        assert!(ready);
        assert!(mgr.is_ready());
        assert!(mgr.is_connected());
        assert_eq!(mgr.timer_state(), TimerState::Stopped);
        assert_eq!(mgr.connect_attempts(), 0);

        // Stopped timer, so no second notification.
        ev.run_until(Duration::from_millis(50), || false).unwrap();
        assert_eq!(*events.borrow(), vec![("wlan0".to_string(), 2, 2)]);

        // Already connected: connect() leaves the timer alone.
        mgr.connect();
        assert_eq!(mgr.timer_state(), TimerState::Stopped);
    }

    #[test]
    fn test_disabled_interface_does_not_block_cycle() {
        let f = Fixture::new();
        f.daemon.set_running(true);
        let _p0 = FakeCtrlPeer::spawn(f.ctrl_dir(), "wlan0", |_| vec![]).unwrap();
        let mgr = f.manager();
        let (a, b) = (f.iface("wlan0"), f.iface("wlan1"));
        b.enable(false);
        mgr.register_interface(&a);
        mgr.register_interface(&b);

        let fired = Rc::new(Cell::new(0u32));
        let count = Rc::clone(&fired);
        mgr.set_ready_handler(Some(Rc::new(move |_| count.set(count.get() + 1))));

        mgr.connect();
        f.ctx
            .event_loop()
            .run_until(Duration::from_secs(2), || fired.get() > 0)
            .unwrap();
        assert_eq!(fired.get(), 1);
        // The tick's predicate is satisfied, the registry-wide one is not.
        assert!(!mgr.is_ready());
        assert!(a.is_ready());
        assert!(!b.is_ready());
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let f = Fixture::new();
        f.daemon.set_running(true);
        let mgr = f.manager();
        mgr.register_interface(&f.iface("wlan0"));

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        mgr.set_ready_handler(Some(Rc::new(move |_| flag.set(true))));

        mgr.connect();
        let ev = f.ctx.event_loop();
        ev.run_until(Duration::from_secs(2), || mgr.timer_state() == TimerState::Stopped)
            .unwrap();
        assert_eq!(mgr.timer_state(), TimerState::Stopped);
        assert_eq!(mgr.connect_attempts(), 0);
        assert!(!fired.get());
        assert!(!mgr.is_ready());
    }

    #[test]
    fn test_disconnect_closes_but_keeps_registrations() {
        let f = Fixture::new();
        let _p0 = FakeCtrlPeer::spawn(f.ctrl_dir(), "wlan0", |_| vec![]).unwrap();
        let mgr = f.manager();
        let iface = f.iface("wlan0");
        mgr.register_interface(&iface);
        iface.open().unwrap();

        mgr.disconnect();
        assert!(!iface.is_ready());
        assert_eq!(mgr.count_interfaces(), 1);
        assert_eq!(iface.manager(), Some(mgr.id()));
        assert_eq!(mgr.timer_state(), TimerState::Stopped);
    }

    #[test]
    fn test_cleanup_unregisters_and_removes_timer() {
        let f = Fixture::new();
        let _p0 = FakeCtrlPeer::spawn(f.ctrl_dir(), "wlan0", |_| vec![]).unwrap();
        let mgr = f.manager();
        let iface = f.iface("wlan0");
        mgr.register_interface(&iface);
        iface.open().unwrap();
        let id = mgr.id();

        mgr.cleanup();
        assert!(!iface.is_ready());
        assert_eq!(iface.manager(), None);
        assert!(f.ctx.manager(id).is_none());
    }

    #[test]
    fn test_reset_rebinds_daemon() {
        let f = Fixture::new();
        let mgr = f.manager();
        let iface = f.iface("wlan0");
        mgr.register_interface(&iface);

        let other = Rc::new(DaemonHandle::new("wpa_supplicant", f.tmp.path()));
        mgr.reset(other);
        assert_eq!(mgr.count_interfaces(), 0);
        assert_eq!(iface.manager(), None);
        assert_eq!(mgr.daemon().name(), "wpa_supplicant");
    }
}
