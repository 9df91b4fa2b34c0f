use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use tokio_util::codec::Decoder;

use crate::protocol::FormatCode;
use crate::protocol::codec::{PostgresCodec, StartupCodec, get_cstring, get_nullable_bytes};
use crate::protocol::error::ProtocolError;

/// Ensures that the buffer has at least `n` bytes remaining.
/// Returns `ProtocolError::InvalidMessage` if not enough bytes are available.
macro_rules! ensure_remaining {
    ($buf:expr, $n:expr) => {
        if $buf.len() < $n {
            return Err(ProtocolError::InvalidMessage);
        }
    };
}

/// SSLRequest magic number
pub const SSL_REQUEST_CODE: i32 = (1234 << 16) | 5679; // 80877103

/// GSSENCRequest magic number
pub const GSSENC_REQUEST_CODE: i32 = (1234 << 16) | 5680; // 80877104

/// CancelRequest magic number
pub const CANCEL_REQUEST_CODE: i32 = (1234 << 16) | 5678; // 80877102

/// Messages sent by the frontend (client) during startup phase.
#[derive(Debug)]
pub enum StartupMessage {
    /// SSLRequest - client wants to negotiate SSL
    SslRequest,
    /// GSSENCRequest - client wants GSSAPI encryption
    GssEncRequest,
    /// CancelRequest - client wants to cancel a query
    CancelRequest { process_id: i32, secret_key: i32 },
    /// StartupMessage - normal connection startup
    Startup {
        protocol_version: i32,
        parameters: StartupParameters,
    },
}

impl StartupMessage {
    /// Decodes a startup message from the buffer.
    /// The buffer should contain a complete message (length already validated).
    fn decode(src: &mut BytesMut) -> Result<Self, ProtocolError> {
        let _len = src.get_i32();
        let code = src.get_i32();

        match code {
            SSL_REQUEST_CODE => Ok(StartupMessage::SslRequest),
            GSSENC_REQUEST_CODE => Ok(StartupMessage::GssEncRequest),
            CANCEL_REQUEST_CODE => {
                ensure_remaining!(src, 8);
                let process_id = src.get_i32();
                let secret_key = src.get_i32();
                Ok(StartupMessage::CancelRequest {
                    process_id,
                    secret_key,
                })
            }
            version if (version >> 16) == 3 => {
                let parameters = StartupParameters::decode(src)?;
                Ok(StartupMessage::Startup {
                    protocol_version: version,
                    parameters,
                })
            }
            _ => Err(ProtocolError::UnsupportedProtocolVersion(code)),
        }
    }
}

/// Startup parameters from the client
#[derive(Debug, Clone, Default)]
pub struct StartupParameters {
    pub user: String,
    pub database: Option<String>,
    pub application_name: Option<String>,
    pub client_encoding: Option<String>,
    pub other: HashMap<String, String>,
}

impl StartupParameters {
    /// Decodes the alternating name/value list that ends with an empty name.
    fn decode(src: &mut BytesMut) -> Result<Self, ProtocolError> {
        let mut params = StartupParameters::default();

        while !src.is_empty() {
            let name = get_cstring(src)?;
            if name.is_empty() {
                break;
            }
            let value = get_cstring(src)?;

            match name.as_str() {
                "user" => params.user = value,
                "database" if !value.is_empty() => params.database = Some(value),
                "application_name" => params.application_name = Some(value),
                "client_encoding" => params.client_encoding = Some(value),
                _ => {
                    params.other.insert(name, value);
                }
            }
        }

        if params.user.is_empty() {
            return Err(ProtocolError::MissingParameter("user"));
        }

        Ok(params)
    }
}

impl Decoder for StartupCodec {
    type Item = StartupMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least 8 bytes (length + code)
        if src.len() < 8 {
            return Ok(None);
        }

        // Peek at the length (don't consume yet)
        let len = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if len < 8 || len as usize > self.max_message_size {
            return Err(ProtocolError::InvalidLength(len));
        }
        let len = len as usize;

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let mut msg_buf = src.split_to(len);
        let msg = StartupMessage::decode(&mut msg_buf)?;
        Ok(Some(msg))
    }
}

/// 'P' - Parse message body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseMessage {
    pub statement_name: String,
    pub query: String,
    pub param_types: Vec<u32>,
}

/// 'B' - Bind message body.
#[derive(Debug, Clone, PartialEq)]
pub struct BindMessage {
    pub portal_name: String,
    pub statement_name: String,
    pub param_format_codes: Vec<FormatCode>,
    pub param_values: Vec<Option<Vec<u8>>>,
    pub result_format_codes: Vec<FormatCode>,
}

/// Target of a Describe message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeTarget {
    Statement,
    Portal,
}

/// 'D' - Describe message body.
#[derive(Debug, Clone, PartialEq)]
pub struct DescribeMessage {
    pub target_type: DescribeTarget,
    pub name: String,
}

/// 'E' - Execute message body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteMessage {
    pub portal_name: String,
    /// Accepted but ignored; portals always run to completion.
    pub max_rows: i32,
}

/// Target of a Close message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTarget {
    Statement,
    Portal,
}

/// 'C' - Close message body.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseMessage {
    pub target_type: CloseTarget,
    pub name: String,
}

/// Messages sent by the frontend (client) after the startup packet.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontendMessage {
    /// 'Q' - Simple query
    Query(String),
    /// 'P' - Parse (create prepared statement)
    Parse(ParseMessage),
    /// 'B' - Bind (create portal)
    Bind(BindMessage),
    /// 'D' - Describe statement or portal
    Describe(DescribeMessage),
    /// 'E' - Execute portal
    Execute(ExecuteMessage),
    /// 'S' - Sync
    Sync,
    /// 'H' - Flush
    Flush,
    /// 'C' - Close statement or portal
    Close(CloseMessage),
    /// 'X' - Termination
    Terminate,
    /// 'p' - Password response
    Password(String),
    /// Any other tag. The payload is dropped; dispatch decides how to answer.
    Unknown(u8),
    /// A complete frame whose strings are not valid UTF-8. The payload is
    /// dropped.
    InvalidEncoding(u8),
}

impl FrontendMessage {
    /// Decodes a frontend message body. `tag` is the type byte; `src` holds
    /// exactly the payload (header already consumed).
    fn decode(tag: u8, src: &mut BytesMut) -> Result<Self, ProtocolError> {
        match tag {
            b'Q' => Ok(FrontendMessage::Query(get_cstring(src)?)),
            b'P' => {
                let statement_name = get_cstring(src)?;
                let query = get_cstring(src)?;
                ensure_remaining!(src, 2);
                let count = src.get_i16();
                if count < 0 {
                    return Err(ProtocolError::InvalidMessage);
                }
                ensure_remaining!(src, count as usize * 4);
                let param_types = (0..count).map(|_| src.get_u32()).collect();
                Ok(FrontendMessage::Parse(ParseMessage {
                    statement_name,
                    query,
                    param_types,
                }))
            }
            b'B' => {
                let portal_name = get_cstring(src)?;
                let statement_name = get_cstring(src)?;
                let param_format_codes = get_format_codes(src)?;
                ensure_remaining!(src, 2);
                let count = src.get_i16();
                if count < 0 {
                    return Err(ProtocolError::InvalidMessage);
                }
                let mut param_values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    param_values.push(get_nullable_bytes(src)?);
                }
                let result_format_codes = get_format_codes(src)?;
                Ok(FrontendMessage::Bind(BindMessage {
                    portal_name,
                    statement_name,
                    param_format_codes,
                    param_values,
                    result_format_codes,
                }))
            }
            b'D' => {
                ensure_remaining!(src, 1);
                let target_type = match src.get_u8() {
                    b'S' => DescribeTarget::Statement,
                    b'P' => DescribeTarget::Portal,
                    _ => return Err(ProtocolError::InvalidMessage),
                };
                let name = get_cstring(src)?;
                Ok(FrontendMessage::Describe(DescribeMessage {
                    target_type,
                    name,
                }))
            }
            b'E' => {
                let portal_name = get_cstring(src)?;
                ensure_remaining!(src, 4);
                let max_rows = src.get_i32();
                Ok(FrontendMessage::Execute(ExecuteMessage {
                    portal_name,
                    max_rows,
                }))
            }
            b'C' => {
                ensure_remaining!(src, 1);
                let target_type = match src.get_u8() {
                    b'S' => CloseTarget::Statement,
                    b'P' => CloseTarget::Portal,
                    _ => return Err(ProtocolError::InvalidMessage),
                };
                let name = get_cstring(src)?;
                Ok(FrontendMessage::Close(CloseMessage { target_type, name }))
            }
            b'S' => Ok(FrontendMessage::Sync),
            b'H' => Ok(FrontendMessage::Flush),
            b'X' => Ok(FrontendMessage::Terminate),
            b'p' => Ok(FrontendMessage::Password(get_cstring(src)?)),
            other => Ok(FrontendMessage::Unknown(other)),
        }
    }
}

/// Reads an Int16 count followed by that many Int16 format codes.
fn get_format_codes(src: &mut BytesMut) -> Result<Vec<FormatCode>, ProtocolError> {
    ensure_remaining!(src, 2);
    let count = src.get_i16();
    if count < 0 {
        return Err(ProtocolError::InvalidMessage);
    }
    ensure_remaining!(src, count as usize * 2);
    (0..count)
        .map(|_| FormatCode::try_from(src.get_i16()).map_err(|_| ProtocolError::InvalidMessage))
        .collect()
}

impl Decoder for PostgresCodec {
    type Item = FrontendMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least 5 bytes (type + length)
        if src.len() < 5 {
            return Ok(None);
        }

        // Peek at the length (bytes 1-4, don't consume yet)
        let len = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if len < 4 || len as usize > self.max_message_size {
            return Err(ProtocolError::InvalidLength(len));
        }

        // Total message size = 1 (type byte) + length
        let frame_len = 1 + len as usize;

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut msg_buf = src.split_to(frame_len);
        let tag = msg_buf.get_u8();
        msg_buf.advance(4);
        match FrontendMessage::decode(tag, &mut msg_buf) {
            Ok(msg) => Ok(Some(msg)),
            // The frame was split off whole, so the stream is still in sync.
            Err(ProtocolError::InvalidUtf8(_)) => Ok(Some(FrontendMessage::InvalidEncoding(tag))),
            Err(e) => Err(e),
        }
    }
}
