//! Control-directory scanning.
//!
//! A daemon creates one control socket per interface in its control
//! directory. Each entry is mapped to a known [`Interface`] by exact name, or
//! through the context's [`LinkResolver`] when the socket name differs from
//! the logical interface name (e.g. `wlan0.1` serving `wlan0`).

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use super::interface::Interface;
use super::manager::ManagerInner;
use crate::context::CtrlContext;
use crate::error::CtrlError;

/// Maps a control socket name to the logical interface it serves.
pub trait LinkResolver {
    fn fetch_link_interface_name(&self, sock_name: &str) -> Option<String>;
}

impl<F> LinkResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn fetch_link_interface_name(&self, sock_name: &str) -> Option<String> {
        self(sock_name)
    }
}

/// Resolver backed by a fixed table, built from the `[links]` config section.
#[derive(Debug, Clone, Default)]
pub struct StaticLinkResolver {
    links: BTreeMap<String, String>,
}

impl StaticLinkResolver {
    pub fn new(links: BTreeMap<String, String>) -> Self {
        Self { links }
    }
}

impl LinkResolver for StaticLinkResolver {
    fn fetch_link_interface_name(&self, sock_name: &str) -> Option<String> {
        self.links.get(sock_name).cloned()
    }
}

/// Counters from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Directory entries seen.
    pub entries: usize,
    /// Entries mapped to a known interface.
    pub resolved: usize,
    /// Interfaces opened by this scan.
    pub opened: usize,
}

/// Sorted entry names of `dir`. A directory that does not exist yet has no
/// entries.
pub fn list_control_sockets(dir: impl AsRef<Path>) -> Result<Vec<String>, CtrlError> {
    let dir = dir.as_ref();
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(CtrlError::Scan {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| CtrlError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != "." && name != ".." {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Map a socket name to an interface. The scanning manager's own registry
/// wins over the context catalog, so daemons may reuse interface names.
fn resolve(ctx: &CtrlContext, scanning: &ManagerInner, sock_name: &str) -> Option<Interface> {
    let linked = ctx.fetch_link_interface_name(sock_name);
    let candidates = std::iter::once(sock_name).chain(linked.as_deref());
    let mut fallback = None;
    for name in candidates {
        if let Some(iface) = scanning.registered(name) {
            return Some(iface);
        }
        if fallback.is_none() {
            fallback = ctx.find_interface(name);
        }
    }
    fallback
}

/// One discovery pass on behalf of `scanning`.
pub(crate) fn scan(ctx: &CtrlContext, scanning: &ManagerInner) -> Result<DiscoveryReport, CtrlError> {
    let ctrl_dir = scanning.daemon().ctrl_dir();
    let names = list_control_sockets(&ctrl_dir)?;
    let mut report = DiscoveryReport {
        entries: names.len(),
        ..DiscoveryReport::default()
    };

    for sock_name in &names {
        let Some(iface) = resolve(ctx, scanning, sock_name) else {
            debug!(sock = %sock_name, dir = %ctrl_dir.display(), "no interface for socket");
            continue;
        };
        report.resolved += 1;

        let Some(owner_id) = iface.manager() else {
            debug!(sock = %sock_name, iface = iface.name(), "interface has no manager");
            continue;
        };
        let Some(owner) = ctx.manager(owner_id) else {
            continue;
        };

        let owner_daemon = owner.daemon();
        if owner_daemon.is_running() && iface.sock_name() != *sock_name {
            if let Err(e) = iface.set_connection_info(owner_daemon.ctrl_dir(), sock_name) {
                warn!(sock = %sock_name, iface = iface.name(), error = %e, "rebind failed");
                continue;
            }
        }

        if owner.id() != scanning.id() || iface.is_ready() {
            continue;
        }
        iface.enable(true);
        match iface.open() {
            Ok(()) => report.opened += 1,
            Err(e) => {
                warn!(sock = %sock_name, iface = iface.name(), error = %e, "open failed");
            }
        }
    }

    debug!(
        dir = %ctrl_dir.display(),
        entries = report.entries,
        resolved = report.resolved,
        opened = report.opened,
        "discovery pass"
    );
    Ok(report)
}
