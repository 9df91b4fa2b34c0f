//! TCP server for PostgreSQL-compatible connections.
//!
//! This module provides the network layer that accepts client connections
//! and drives each one through the PostgreSQL wire protocol.
//!
//! ## Architecture
//!
//! ```text
//! +--------+
//! | Server |  <- Accepts TCP connections, one task each
//! +--------+
//!      |
//!      v
//! +-----------+     +---------+
//! | Handshake | --> | Session |  <- SSL decline, startup, password
//! +-----------+     +---------+
//!      |                 ^
//!      v                 |
//! +------------+         |
//! | Connection | --------+  <- Simple and extended query dispatch
//! +------------+
//! ```
//!
//! ## Terminology
//!
//! - **Server**: TCP listener that spawns connections
//! - **Session**: Per-client state (auth lifecycle, statements, portals)
//! - **Handshake**: SSL negotiation, startup parameters and authentication
//! - **Connection**: Query-phase message loop over one session

pub mod connection;
pub mod handshake;
pub mod listener;
pub mod session;

pub use connection::{Connection, ConnectionError, handle_connection};
pub use listener::Server;
pub use session::{Session, SessionState};
