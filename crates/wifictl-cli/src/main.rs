#![deny(unsafe_code)]

//! wifictl: talk to hostapd / wpa_supplicant control sockets.

mod monitor;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wifictl_config::AppConfig;
use wifictl_core::ctrl::list_control_sockets;
use wifictl_core::{Connection, CtrlContext, EventLoop, build_info};

/// wifictl — control-socket client for WiFi daemons.
#[derive(Parser)]
#[command(name = "wifictl", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "wifictl.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one command and print the reply.
    Send(SendArgs),

    /// List the control sockets in a daemon's control directory.
    Scan {
        /// Control directory, e.g. /var/run/hostapd.
        #[arg(long)]
        dir: PathBuf,

        /// Print a JSON array instead of one name per line.
        #[arg(long)]
        json: bool,
    },

    /// Supervise every configured daemon and print events until Ctrl-C.
    Monitor,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Show build information.
    Version,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Control directory holding the server socket.
    #[arg(long)]
    dir: PathBuf,

    /// Server socket name, usually the interface name.
    #[arg(long)]
    sock: String,

    /// Suffix for the client socket name. Defaults to the process id.
    #[arg(long, allow_negative_numbers = true)]
    id: Option<i32>,

    /// Reply timeout in milliseconds (never less than 1000).
    #[arg(long)]
    timeout: Option<u64>,

    /// Fail unless the reply equals this text.
    #[arg(long)]
    expect: Option<String>,

    /// Command words, joined with spaces.
    #[arg(required = true, trailing_var_arg = true)]
    cmd: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
    if !found {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Send(args) => cmd_send(config, args).await?,
        Commands::Scan { dir, json } => cmd_scan(&dir, json)?,
        Commands::Monitor => cmd_monitor(config).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Version => println!("wifictl {}", build_info::version_string()),
    }

    Ok(())
}

async fn cmd_send(config: AppConfig, args: SendArgs) -> Result<()> {
    let reply = tokio::task::spawn_blocking(move || send_once(&config, &args))
        .await
        .context("send task panicked")??;
    println!("{reply}");
    Ok(())
}

/// One open / exchange / close round trip.
fn send_once(config: &AppConfig, args: &SendArgs) -> Result<String> {
    let ctx = CtrlContext::from_config(config, EventLoop::new());
    let id = args.id.unwrap_or_else(|| std::process::id() as i32);
    let cmd = args.cmd.join(" ");
    let timeout = Duration::from_millis(args.timeout.unwrap_or(config.ctrl.cmd_timeout_ms));

    let mut conn = Connection::init(&ctx, &args.dir, &args.sock, id)?;
    conn.open()
        .with_context(|| format!("connecting to {}", conn.server_path().display()))?;
    debug!(cmd = %cmd, ?timeout, "sending");

    let result = match &args.expect {
        Some(expected) => conn
            .send_cmd_check_response_ext(&cmd, expected, timeout)
            .map(|()| expected.clone()),
        None => conn.send_cmd_synced_ext(&cmd, timeout),
    };
    conn.cleanup();
    result.with_context(|| format!("command {cmd:?} failed"))
}

fn cmd_scan(dir: &Path, json: bool) -> Result<()> {
    let names = list_control_sockets(dir)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(())
}

async fn cmd_monitor(config: AppConfig) -> Result<()> {
    if config.daemons.is_empty() {
        bail!("no [[daemons]] configured, nothing to monitor");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut worker = tokio::task::spawn_blocking({
        let stop = Arc::clone(&stop);
        move || monitor::run(&config, &stop)
    });

    tokio::select! {
        res = &mut worker => return res.context("monitor task panicked")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("interrupted, shutting down");
            stop.store(true, Ordering::Relaxed);
        }
    }
    worker.await.context("monitor task panicked")?
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("serializing config")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// Load and validate `path`; a missing file yields the defaults.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wifictl_test_utils::config::TestConfigBuilder;
    use wifictl_test_utils::daemon::TestDaemon;

    fn send_args(daemon: &TestDaemon, cmd: &[&str], expect: Option<&str>) -> SendArgs {
        SendArgs {
            dir: daemon.ctrl_dir().to_path_buf(),
            sock: "wlan0".to_string(),
            id: Some(3),
            timeout: None,
            expect: expect.map(str::to_string),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_send_command() {
        let cli = Cli::try_parse_from([
            "wifictl", "send", "--dir", "/var/run/hostapd", "--sock", "wlan0", "--id", "-1",
            "SET", "ssid", "lab",
        ])
        .unwrap();
        let Commands::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.id, Some(-1));
        assert_eq!(args.cmd, vec!["SET", "ssid", "lab"]);
        assert_eq!(args.dir, PathBuf::from("/var/run/hostapd"));
    }

    #[test]
    fn test_send_requires_command() {
        assert!(Cli::try_parse_from(["wifictl", "send", "--dir", "/d", "--sock", "s"]).is_err());
    }

    #[test_log::test]
    fn test_send_once_joins_words_and_cleans_up() {
        let daemon = TestDaemon::running("hostapd").unwrap();
        let peer = daemon
            .spawn_peer("wlan0", |cmd| vec![format!("got {cmd}\n").into_bytes()])
            .unwrap();
        let config = TestConfigBuilder::new().client_dir(daemon.client_dir()).build();

        let reply = send_once(&config, &send_args(&daemon, &["GET", "ssid"], None)).unwrap();
        assert_eq!(reply, "got GET ssid");
        assert_eq!(peer.received(), vec!["GET ssid".to_string()]);
        assert!(!daemon.client_dir().join("wlan0-3").exists());
    }

    #[test_log::test]
    fn test_send_once_expect_mismatch_fails() {
        let daemon = TestDaemon::running("hostapd").unwrap();
        let _peer = daemon.spawn_peer("wlan0", |_| vec![b"FAIL\n".to_vec()]).unwrap();
        let config = TestConfigBuilder::new().client_dir(daemon.client_dir()).build();

        let err = send_once(&config, &send_args(&daemon, &["ENABLE"], Some("OK"))).unwrap_err();
        assert!(format!("{err:#}").contains("ENABLE"));
    }

    #[test]
    fn test_send_once_without_daemon_fails() {
        let daemon = TestDaemon::new("hostapd").unwrap();
        let config = TestConfigBuilder::new().client_dir(daemon.client_dir()).build();
        assert!(send_once(&config, &send_args(&daemon, &["PING"], None)).is_err());
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        wifictl_test_utils::tracing_setup::init_test_tracing();
        let tmp = tempfile::TempDir::new().unwrap();
        let (config, found) = load_config(&tmp.path().join("absent.toml")).await.unwrap();
        assert!(!found);
        assert!(config.daemons.is_empty());
    }
}
