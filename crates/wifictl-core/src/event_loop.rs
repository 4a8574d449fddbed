//! Single-threaded I/O readiness reactor.
//!
//! Connections register their sockets here under a read-ready callback and
//! managers register their reconnect timers. Everything runs on the thread
//! that drives [`EventLoop::run_once`]; no callback ever runs concurrently
//! with another.
//!
//! The loop never holds an internal borrow while a callback runs, so callbacks
//! are free to add or remove readers and timers (including their own).

use std::cell::{Cell, RefCell};
use std::os::fd::AsFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::trace;

use crate::error::CtrlError;

/// Longest single wait inside [`EventLoop::run`] before the stop predicate is rechecked.
const RUN_SLICE: Duration = Duration::from_millis(100);

/// Handle to a registered read source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

/// Handle to a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Lifecycle of a periodic timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Not scheduled.
    Stopped,
    /// Scheduled, first expiry still pending.
    Armed,
    /// Has fired at least once and keeps firing every interval.
    Running,
}

type Callback = Rc<RefCell<dyn FnMut()>>;

struct Reader {
    id: SourceId,
    source: Rc<dyn AsFd>,
    callback: Callback,
}

struct Timer {
    id: TimerId,
    interval: Duration,
    state: TimerState,
    deadline: Option<Instant>,
    callback: Callback,
}

#[derive(Default)]
struct LoopState {
    next_id: Cell<u64>,
    readers: RefCell<Vec<Reader>>,
    timers: RefCell<Vec<Timer>>,
}

impl LoopState {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

/// Cheaply cloneable handle to one reactor. Clones share the same state.
#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<LoopState>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("readers", &self.reader_count())
            .field("timers", &self.state.timers.borrow().len())
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` whenever `source` becomes readable.
    pub fn add_reader(&self, source: Rc<dyn AsFd>, callback: impl FnMut() + 'static) -> SourceId {
        let id = SourceId(self.state.next_id());
        self.state.readers.borrow_mut().push(Reader {
            id,
            source,
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    /// Deregister a reader. Returns `false` if it was not registered.
    pub fn remove_reader(&self, id: SourceId) -> bool {
        let mut readers = self.state.readers.borrow_mut();
        let before = readers.len();
        readers.retain(|r| r.id != id);
        readers.len() != before
    }

    pub fn has_reader(&self, id: SourceId) -> bool {
        self.state.readers.borrow().iter().any(|r| r.id == id)
    }

    pub fn reader_count(&self) -> usize {
        self.state.readers.borrow().len()
    }

    /// Create a stopped periodic timer.
    pub fn add_timer(&self, interval: Duration, callback: impl FnMut() + 'static) -> TimerId {
        let id = TimerId(self.state.next_id());
        self.state.timers.borrow_mut().push(Timer {
            id,
            interval,
            state: TimerState::Stopped,
            deadline: None,
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    /// Schedule the first expiry after `first_delay`; later expiries follow
    /// the timer's interval. Re-arming an active timer restarts it.
    pub fn arm_timer(&self, id: TimerId, first_delay: Duration) {
        if let Some(timer) = self.state.timers.borrow_mut().iter_mut().find(|t| t.id == id) {
            timer.state = TimerState::Armed;
            timer.deadline = Some(Instant::now() + first_delay);
        }
    }

    pub fn stop_timer(&self, id: TimerId) {
        if let Some(timer) = self.state.timers.borrow_mut().iter_mut().find(|t| t.id == id) {
            timer.state = TimerState::Stopped;
            timer.deadline = None;
        }
    }

    pub fn remove_timer(&self, id: TimerId) -> bool {
        let mut timers = self.state.timers.borrow_mut();
        let before = timers.len();
        timers.retain(|t| t.id != id);
        timers.len() != before
    }

    /// `None` once the timer has been removed.
    pub fn timer_state(&self, id: TimerId) -> Option<TimerState> {
        self.state
            .timers
            .borrow()
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.state)
    }

    /// Wait up to `max_wait` (less if a timer expires sooner) and dispatch
    /// every ready reader and every expired timer once. Returns how many
    /// callbacks ran.
    pub fn run_once(&self, max_wait: Duration) -> Result<usize, CtrlError> {
        let wait = match self.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(max_wait),
            None => max_wait,
        };

        let readers: Vec<(SourceId, Rc<dyn AsFd>, Callback)> = self
            .state
            .readers
            .borrow()
            .iter()
            .map(|r| (r.id, Rc::clone(&r.source), Rc::clone(&r.callback)))
            .collect();

        let mut dispatched = 0;
        if readers.is_empty() {
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        } else {
            let ready = match wait_readable(readers.iter().map(|(_, s, _)| s.as_ref()), wait) {
                Ok(ready) => ready,
                Err(Errno::EINTR) => vec![false; readers.len()],
                Err(e) => return Err(e.into()),
            };
            for ((id, _, callback), ready) in readers.iter().zip(ready) {
                // An earlier callback in this round may have deregistered it.
                if ready && self.has_reader(*id) {
                    trace!(source = id.0, "dispatching reader");
                    invoke(callback);
                    dispatched += 1;
                }
            }
        }

        dispatched += self.fire_due_timers(Instant::now());
        Ok(dispatched)
    }

    /// Keep dispatching until `done` returns true or `timeout` elapses.
    /// Returns the final value of `done`.
    pub fn run_until(
        &self,
        timeout: Duration,
        mut done: impl FnMut() -> bool,
    ) -> Result<bool, CtrlError> {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            self.run_once(remaining.min(RUN_SLICE))?;
        }
    }

    /// Dispatch until `should_stop` returns true. The predicate is checked at
    /// least every 100 ms.
    pub fn run(&self, mut should_stop: impl FnMut() -> bool) -> Result<(), CtrlError> {
        while !should_stop() {
            self.run_once(RUN_SLICE)?;
        }
        Ok(())
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.state
            .timers
            .borrow()
            .iter()
            .filter_map(|t| t.deadline)
            .min()
    }

    fn fire_due_timers(&self, now: Instant) -> usize {
        let due: Vec<(TimerId, Callback)> = self
            .state
            .timers
            .borrow_mut()
            .iter_mut()
            .filter(|t| t.deadline.is_some_and(|d| d <= now))
            .map(|t| {
                t.state = TimerState::Running;
                t.deadline = Some(now + t.interval);
                (t.id, Rc::clone(&t.callback))
            })
            .collect();

        let mut fired = 0;
        for (id, callback) in due {
            // Stopped or removed by a callback that ran before it.
            if self.timer_state(id) != Some(TimerState::Running) {
                continue;
            }
            trace!(timer = id.0, "firing timer");
            invoke(&callback);
            fired += 1;
        }
        fired
    }
}

fn invoke(callback: &Callback) {
    // A callback that re-enters the loop must not be dispatched recursively.
    if let Ok(mut f) = callback.try_borrow_mut() {
        (&mut *f)();
    }
}

/// Convert a wait budget into a poll(2) timeout, rounding sub-millisecond
/// remainders up. Budgets beyond the poll range are capped; callers loop.
pub(crate) fn poll_timeout(wait: Duration) -> PollTimeout {
    let ms = wait.as_micros().div_ceil(1000);
    PollTimeout::from(u16::try_from(ms).unwrap_or(u16::MAX))
}

/// poll(2) the given sources for readability once. Returns one flag per source.
pub(crate) fn wait_readable<'a>(
    sources: impl Iterator<Item = &'a dyn AsFd>,
    wait: Duration,
) -> Result<Vec<bool>, Errno> {
    let mut fds: Vec<PollFd<'_>> = sources
        .map(|s| PollFd::new(s.as_fd(), PollFlags::POLLIN))
        .collect();
    poll(&mut fds, poll_timeout(wait))?;
    let readable = PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP;
    Ok(fds
        .iter()
        .map(|fd| fd.revents().is_some_and(|r| r.intersects(readable)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixDatagram;

    #[test]
    fn test_timer_fires_after_first_delay_then_periodically() {
        let ev = EventLoop::new();
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let timer = ev.add_timer(Duration::from_millis(20), move || c.set(c.get() + 1));
        assert_eq!(ev.timer_state(timer), Some(TimerState::Stopped));

        ev.arm_timer(timer, Duration::from_millis(5));
        assert_eq!(ev.timer_state(timer), Some(TimerState::Armed));

        let fired = ev.run_until(Duration::from_secs(2), || count.get() >= 3).unwrap();
        assert!(fired);
        assert_eq!(ev.timer_state(timer), Some(TimerState::Running));
    }

    #[test]
    fn test_stopped_timer_does_not_fire() {
        let ev = EventLoop::new();
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let timer = ev.add_timer(Duration::from_millis(5), move || c.set(c.get() + 1));
        ev.arm_timer(timer, Duration::from_millis(5));
        ev.stop_timer(timer);

        ev.run_until(Duration::from_millis(50), || false).unwrap();
        assert_eq!(count.get(), 0);
        assert_eq!(ev.timer_state(timer), Some(TimerState::Stopped));
    }

    #[test]
    fn test_timer_can_stop_itself() {
        let ev = EventLoop::new();
        let count = Rc::new(Cell::new(0u32));
        let slot: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));

        let (c, s, handle) = (Rc::clone(&count), Rc::clone(&slot), ev.clone());
        let timer = ev.add_timer(Duration::from_millis(1), move || {
            c.set(c.get() + 1);
            if let Some(id) = s.get() {
                handle.stop_timer(id);
            }
        });
        slot.set(Some(timer));
        ev.arm_timer(timer, Duration::ZERO);

        ev.run_until(Duration::from_millis(50), || false).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_removed_timer_reports_none() {
        let ev = EventLoop::new();
        let timer = ev.add_timer(Duration::from_millis(1), || {});
        assert!(ev.remove_timer(timer));
        assert!(!ev.remove_timer(timer));
        assert_eq!(ev.timer_state(timer), None);
    }

    #[test]
    fn test_reader_dispatch_on_datagram() {
        let ev = EventLoop::new();
        let (a, b) = UnixDatagram::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let a = Rc::new(a);

        let received = Rc::new(RefCell::new(Vec::new()));
        let (sock, sink) = (Rc::clone(&a), Rc::clone(&received));
        let id = ev.add_reader(a.clone(), move || {
            let mut buf = [0u8; 64];
            while let Ok(n) = sock.recv(&mut buf) {
                sink.borrow_mut().push(buf[..n].to_vec());
            }
        });
        assert!(ev.has_reader(id));

        b.send(b"<3>CTRL-EVENT-CONNECTED").unwrap();
        let got = ev
            .run_until(Duration::from_secs(1), || !received.borrow().is_empty())
            .unwrap();
        assert!(got);
        assert_eq!(received.borrow()[0], b"<3>CTRL-EVENT-CONNECTED");

        assert!(ev.remove_reader(id));
        assert_eq!(ev.reader_count(), 0);
    }

    #[test]
    fn test_run_once_with_nothing_registered_waits() {
        let ev = EventLoop::new();
        let started = Instant::now();
        assert_eq!(ev.run_once(Duration::from_millis(20)).unwrap(), 0);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_poll_timeout_rounds_up() {
        assert_eq!(poll_timeout(Duration::from_micros(1)), PollTimeout::from(1u16));
        assert_eq!(
            poll_timeout(Duration::from_millis(1000)),
            PollTimeout::from(1000u16)
        );
        assert_eq!(
            poll_timeout(Duration::from_secs(3600)),
            PollTimeout::from(u16::MAX)
        );
    }
}
