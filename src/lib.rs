//! Share a single file over HTTP, opening a temporary firewall rule for the
//! lifetime of the process.

pub mod address;
pub mod config;
pub mod firewall;
pub mod lifecycle;
pub mod logging;
pub mod precheck;
pub mod server;
