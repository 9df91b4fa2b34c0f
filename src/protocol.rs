//! PostgreSQL wire protocol implementation.
//!
//! This module implements the server side of the PostgreSQL v3.0 wire
//! protocol: framing, frontend message decoding and backend message
//! encoding. Both Simple Query and Extended Query messages are covered.
//!
//! ## Architecture
//!
//! ```text
//! +----------+                           +----------+
//! |  Client  |  --- FrontendMessage -->  |  Server  |
//! |  (psql)  |  <-- BackendMessage  ---  | (flatpg) |
//! +----------+                           +----------+
//!               ^                   ^
//!               |   PostgresCodec   |
//!               +-------------------+
//! ```
//!
//! ## Terminology
//!
//! - **FrontendMessage**: Messages from client to server (Query, Parse, Bind, etc.)
//! - **StartupMessage**: Untagged frontend messages for connection handshake (SSL, Startup, Cancel)
//! - **BackendMessage**: Messages from server to client (RowDescription, DataRow, etc.)
//! - **Codec**: Framing and serialization for the wire protocol

pub mod backend;
pub mod codec;
pub mod error;
pub mod frontend;
pub mod types;

pub use backend::{
    BackendMessage, DataValue, ErrorField, ErrorInfo, FieldDescription, Severity,
    TransactionStatus, sql_state,
};
pub use codec::{PostgresCodec, StartupCodec};
pub use error::ProtocolError;
pub use frontend::{
    BindMessage, CloseMessage, CloseTarget, DescribeMessage, DescribeTarget, ExecuteMessage,
    FrontendMessage, ParseMessage, StartupMessage, StartupParameters,
};
pub use types::{ErrorFieldCode, FormatCode, SERVER_PARAMETERS, server_parameter, type_oid};
