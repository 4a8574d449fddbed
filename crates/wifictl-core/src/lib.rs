#![deny(unsafe_code)]

//! wifictl core: a client for the datagram control sockets exposed by
//! hostapd / wpa_supplicant style daemons.
//!
//! Everything here is single-threaded and driven by an [`EventLoop`]. A
//! [`CtrlContext`] holds process-wide settings and registries and is passed
//! to every constructor.

/// Compile-time build metadata (version, git describe, profile).
pub mod build_info;
/// Shared settings and registries passed to every constructor.
pub mod context;
/// Connections, interfaces, managers and directory discovery.
pub mod ctrl;
/// Boundary to the external control daemon.
pub mod daemon;
pub mod error;
/// poll(2) reactor for socket readers and timers.
pub mod event_loop;
/// Optional vendor capability set.
pub mod vendor;

pub use context::{CtrlContext, CtrlSettings};
pub use ctrl::{Connection, DiscoveryReport, Interface, LinkResolver, Manager, ReadyEvent};
pub use daemon::{ControlDaemon, CtrlDirDaemon, DaemonHandle};
pub use error::{CtrlError, ErrorKind};
pub use event_loop::{EventLoop, TimerState};
pub use vendor::Vendor;
