//! `wifictl monitor`: one manager per configured daemon on a private event
//! loop, printing daemon events until asked to stop.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use wifictl_config::AppConfig;
use wifictl_core::{
    ControlDaemon, CtrlContext, CtrlDirDaemon, EventLoop, Interface, Manager, ReadyEvent,
    TimerState,
};

/// How often managers that gave up are restarted.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Subscribes the interface to unsolicited events.
const ATTACH_CMD: &str = "ATTACH";

/// Run until `stop` is set. Everything single-threaded lives on this thread.
pub fn run(config: &AppConfig, stop: &AtomicBool) -> Result<()> {
    let ctx = CtrlContext::from_config(config, EventLoop::new());
    let mut interfaces = Vec::new();
    let mut managers = Vec::new();

    for (idx, daemon_cfg) in config.daemons.iter().enumerate() {
        let daemon: Rc<dyn ControlDaemon> =
            Rc::new(CtrlDirDaemon::new(&daemon_cfg.name, &daemon_cfg.ctrl_dir));
        let manager = Manager::new(&ctx, daemon);
        let conn_id = i32::try_from(idx).context("too many daemons")?;

        for iface_cfg in &daemon_cfg.interfaces {
            let iface = Interface::new(
                &ctx,
                &iface_cfg.name,
                conn_id,
                &daemon_cfg.ctrl_dir,
                iface_cfg.sock_name(),
            )
            .with_context(|| format!("interface {}", iface_cfg.name))?;
            iface.enable(iface_cfg.enabled);

            let label = format!("{}/{}", daemon_cfg.name, iface_cfg.name);
            iface.set_event_handler(Some(Box::new(move |event: &str| {
                println!("{label}: {event}");
            })));
            manager.register_interface(&iface);
            interfaces.push(iface);
        }

        manager.set_ready_handler(Some(Rc::new(attach_all(ctx.clone(), daemon_cfg.name.clone()))));
        manager.connect();
        managers.push(manager);
    }

    let managers = Rc::new(managers);
    let restart = ctx.event_loop().add_timer(RECONNECT_INTERVAL, {
        let managers = Rc::clone(&managers);
        move || {
            for manager in managers.iter() {
                if !manager.is_connected() && manager.timer_state() == TimerState::Stopped {
                    manager.connect();
                }
            }
        }
    });
    ctx.event_loop().arm_timer(restart, RECONNECT_INTERVAL);

    info!(daemons = managers.len(), interfaces = interfaces.len(), "monitoring");
    let result = ctx.event_loop().run(|| stop.load(Ordering::Relaxed));
    ctx.event_loop().remove_timer(restart);
    result.context("event loop failed")
}

/// Ready handler that subscribes every ready interface of the manager.
fn attach_all(ctx: CtrlContext, daemon: String) -> impl Fn(&ReadyEvent) {
    move |event: &ReadyEvent| {
        info!(daemon = %daemon, source = event.source.name(), ready = event.ready, "daemon ready");
        println!("{daemon}: ready ({}/{} interfaces)", event.ready, event.enabled);
        let ready = ctx
            .interfaces()
            .into_iter()
            .filter(|i| i.manager() == Some(event.manager) && i.is_ready());
        for iface in ready {
            if let Err(e) = iface.send_cmd_check_response(ATTACH_CMD, "OK") {
                warn!(iface = iface.name(), error = %e, "attach failed");
            }
        }
    }
}
