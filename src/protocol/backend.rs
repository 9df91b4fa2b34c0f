use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::codec::{PostgresCodec, StartupCodec, put_cstring};
use crate::protocol::{ErrorFieldCode, FormatCode, ProtocolError};

/// SQLSTATE codes used by the server.
/// See: https://www.postgresql.org/docs/current/errcodes-appendix.html
pub mod sql_state {
    pub const SUCCESSFUL_COMPLETION: &str = "00000";
    pub const WARNING: &str = "01000";
    pub const PROTOCOL_VIOLATION: &str = "08P01";
    pub const CHARACTER_NOT_IN_REPERTOIRE: &str = "22021";
    pub const FEATURE_NOT_SUPPORTED: &str = "0A000";
    pub const READ_ONLY_SQL_TRANSACTION: &str = "25006";
    pub const NO_ACTIVE_SQL_TRANSACTION: &str = "25P01";
    pub const INVALID_SQL_STATEMENT_NAME: &str = "26000";
    pub const INVALID_AUTHORIZATION_SPECIFICATION: &str = "28000";
    pub const INVALID_PASSWORD: &str = "28P01";
    pub const INVALID_CURSOR_NAME: &str = "34000";
    pub const INVALID_CATALOG_NAME: &str = "3D000";
    pub const SYNTAX_ERROR: &str = "42601";
    pub const UNDEFINED_COLUMN: &str = "42703";
    pub const UNDEFINED_OBJECT: &str = "42704";
    pub const UNDEFINED_TABLE: &str = "42P01";
    pub const IO_ERROR: &str = "58030";
    pub const INTERNAL_ERROR: &str = "XX000";
}

/// A single column value in a DataRow. `None` is SQL NULL.
pub type DataValue = Option<Vec<u8>>;

/// Messages sent by the backend (server) to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    /// 'R' - Authentication request for a cleartext password
    AuthenticationCleartextPassword,
    /// 'R' - Authentication response (AuthenticationOk)
    AuthenticationOk,
    /// 'K' - Backend key data for cancel requests
    BackendKeyData { process_id: i32, secret_key: i32 },
    /// 'S' - Parameter status notification
    ParameterStatus { name: String, value: String },
    /// 'Z' - Ready for query
    ReadyForQuery { status: TransactionStatus },
    /// 'T' - Row description
    RowDescription { fields: Vec<FieldDescription> },
    /// 'D' - Data row
    DataRow { values: Vec<DataValue> },
    /// 'C' - Command complete
    CommandComplete { tag: String },
    /// 'I' - Empty query response
    EmptyQueryResponse,
    /// 'N' - Notice response
    NoticeResponse { fields: Vec<ErrorField> },
    /// 'E' - Error response
    ErrorResponse { fields: Vec<ErrorField> },
    /// '1' - Parse complete
    ParseComplete,
    /// '2' - Bind complete
    BindComplete,
    /// '3' - Close complete
    CloseComplete,
    /// 'n' - No data
    NoData,
    /// 't' - Parameter description
    ParameterDescription { param_types: Vec<u32> },
}

impl BackendMessage {
    /// Builds a FATAL-severity ErrorResponse; the server closes the
    /// connection right after sending it.
    pub fn fatal(code: &str, message: impl Into<String>) -> Self {
        ErrorInfo::new(Severity::Fatal, code, message).into_error_response()
    }

    /// Returns the message type byte.
    pub fn tag(&self) -> u8 {
        match self {
            BackendMessage::AuthenticationCleartextPassword | BackendMessage::AuthenticationOk => {
                b'R'
            }
            BackendMessage::BackendKeyData { .. } => b'K',
            BackendMessage::ParameterStatus { .. } => b'S',
            BackendMessage::ReadyForQuery { .. } => b'Z',
            BackendMessage::RowDescription { .. } => b'T',
            BackendMessage::DataRow { .. } => b'D',
            BackendMessage::CommandComplete { .. } => b'C',
            BackendMessage::EmptyQueryResponse => b'I',
            BackendMessage::NoticeResponse { .. } => b'N',
            BackendMessage::ErrorResponse { .. } => b'E',
            BackendMessage::ParseComplete => b'1',
            BackendMessage::BindComplete => b'2',
            BackendMessage::CloseComplete => b'3',
            BackendMessage::NoData => b'n',
            BackendMessage::ParameterDescription { .. } => b't',
        }
    }

    /// Appends the framed message to `dst`.
    ///
    /// The length field is written as a placeholder and patched once the
    /// payload is in place, so it always counts itself plus the payload.
    pub fn encode(&self, dst: &mut BytesMut) {
        let start = dst.len();
        dst.put_u8(self.tag());
        dst.put_i32(0);

        match self {
            BackendMessage::AuthenticationCleartextPassword => dst.put_i32(3),
            BackendMessage::AuthenticationOk => dst.put_i32(0),
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                dst.put_i32(*process_id);
                dst.put_i32(*secret_key);
            }
            BackendMessage::ParameterStatus { name, value } => {
                put_cstring(dst, name);
                put_cstring(dst, value);
            }
            BackendMessage::ReadyForQuery { status } => dst.put_u8(status.as_byte()),
            BackendMessage::RowDescription { fields } => {
                dst.put_i16(fields.len() as i16);
                for field in fields {
                    put_cstring(dst, &field.name);
                    dst.put_u32(field.table_oid);
                    dst.put_i16(field.column_id);
                    dst.put_u32(field.type_oid);
                    dst.put_i16(field.type_size);
                    dst.put_i32(field.type_modifier);
                    dst.put_i16(field.format.as_i16());
                }
            }
            BackendMessage::DataRow { values } => {
                dst.put_i16(values.len() as i16);
                for value in values {
                    match value {
                        Some(bytes) => {
                            dst.put_i32(bytes.len() as i32);
                            dst.put_slice(bytes);
                        }
                        None => dst.put_i32(-1),
                    }
                }
            }
            BackendMessage::CommandComplete { tag } => put_cstring(dst, tag),
            BackendMessage::NoticeResponse { fields }
            | BackendMessage::ErrorResponse { fields } => {
                for field in fields {
                    dst.put_u8(field.code);
                    put_cstring(dst, &field.value);
                }
                dst.put_u8(0);
            }
            BackendMessage::ParameterDescription { param_types } => {
                dst.put_i16(param_types.len() as i16);
                for oid in param_types {
                    dst.put_u32(*oid);
                }
            }
            BackendMessage::EmptyQueryResponse
            | BackendMessage::ParseComplete
            | BackendMessage::BindComplete
            | BackendMessage::CloseComplete
            | BackendMessage::NoData => {}
        }

        let len = (dst.len() - start - 1) as i32;
        dst[start + 1..start + 5].copy_from_slice(&len.to_be_bytes());
    }
}

impl Encoder<BackendMessage> for PostgresCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: BackendMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

impl Encoder<BackendMessage> for StartupCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: BackendMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

/// Transaction status indicator for ReadyForQuery message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// 'I' - Idle (not in a transaction block)
    Idle,
    /// 'E' - In a failed transaction block
    Failed,
}

impl TransactionStatus {
    fn as_byte(self) -> u8 {
        match self {
            TransactionStatus::Idle => b'I',
            TransactionStatus::Failed => b'E',
        }
    }
}

/// One column of a RowDescription.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: u32,
    pub column_id: i16,
    pub type_oid: u32,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: FormatCode,
}

impl FieldDescription {
    /// Describes a computed column: no source table, no type modifier.
    pub fn new(name: impl Into<String>, type_oid: u32, type_size: i16) -> Self {
        Self {
            name: name.into(),
            table_oid: 0,
            column_id: 0,
            type_oid,
            type_size,
            type_modifier: -1,
            format: FormatCode::Text,
        }
    }
}

/// Error/Notice field codes.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorField {
    pub code: u8,
    pub value: String,
}

impl ErrorField {
    pub fn new(code: ErrorFieldCode, value: impl Into<String>) -> Self {
        Self {
            code: code.as_u8(),
            value: value.into(),
        }
    }
}

/// Severity of an error or notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Notice,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Fatal => "FATAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
        }
    }
}

/// Structured content of an ErrorResponse or NoticeResponse.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub hint: Option<String>,
}

impl ErrorInfo {
    pub fn new(severity: Severity, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    fn into_fields(self) -> Vec<ErrorField> {
        let mut fields = vec![
            ErrorField::new(ErrorFieldCode::Severity, self.severity.as_str()),
            ErrorField::new(ErrorFieldCode::SeverityNonLocalized, self.severity.as_str()),
            ErrorField::new(ErrorFieldCode::SqlState, self.code),
            ErrorField::new(ErrorFieldCode::Message, self.message),
        ];
        if let Some(hint) = self.hint {
            fields.push(ErrorField::new(ErrorFieldCode::Hint, hint));
        }
        fields
    }

    pub fn into_error_response(self) -> BackendMessage {
        BackendMessage::ErrorResponse {
            fields: self.into_fields(),
        }
    }

    pub fn into_notice_response(self) -> BackendMessage {
        BackendMessage::NoticeResponse {
            fields: self.into_fields(),
        }
    }
}
