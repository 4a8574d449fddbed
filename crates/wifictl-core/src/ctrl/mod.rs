//! Control-socket protocol client and connection management.

pub mod connection;
pub mod discovery;
pub mod interface;
pub mod manager;

pub use connection::{Connection, DEFAULT_CMD_TIMEOUT, EventHandler};
pub use discovery::{DiscoveryReport, LinkResolver, StaticLinkResolver, list_control_sockets};
pub use interface::Interface;
pub use manager::{Manager, ManagerId, ReadyEvent, ReadyHandler};
