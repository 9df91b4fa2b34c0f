mod error;

pub use error::ConnectionError;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::engine::{QueryEngine, QueryResult};
use crate::protocol::{
    BackendMessage, BindMessage, CloseMessage, CloseTarget, DescribeMessage, DescribeTarget,
    ErrorInfo, ExecuteMessage, FrontendMessage, ParseMessage, PostgresCodec, Severity,
    TransactionStatus, sql_state,
};
use crate::server::handshake::{Handshake, HandshakeResult};
use crate::server::session::{PortalLookupError, Session, SessionState};

/// Serves one client: handshake, then the query loop until the client
/// terminates or the transport fails.
pub async fn handle_connection<T, E>(
    io: T,
    session: Session,
    engine: Arc<E>,
    config: Arc<ServerConfig>,
) -> Result<(), ConnectionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    E: QueryEngine,
{
    let mut session = session;
    let framed = match Handshake::new(&mut session, &config).run(io).await? {
        HandshakeResult::Ready(framed) => framed,
        HandshakeResult::Closed => return Ok(()),
    };

    info!(
        pid = session.pid(),
        user = %session.user(),
        database = %session.database(),
        "connection ready"
    );
    Connection::new(framed, session, engine).run().await
}

/// A single client connection in query phase.
///
/// NOTE: Messages are handled strictly one at a time, and every reply is
/// flushed before the next message is read.
pub struct Connection<T, E> {
    framed: Framed<T, PostgresCodec>,
    session: Session,
    engine: Arc<E>,
}

impl<T, E> Connection<T, E>
where
    T: AsyncRead + AsyncWrite + Unpin,
    E: QueryEngine,
{
    pub fn new(framed: Framed<T, PostgresCodec>, session: Session, engine: Arc<E>) -> Self {
        Self {
            framed,
            session,
            engine,
        }
    }

    pub async fn run(&mut self) -> Result<(), ConnectionError> {
        let result = self.message_loop().await;
        self.session.close();
        result
    }

    async fn message_loop(&mut self) -> Result<(), ConnectionError> {
        while self.session.state() == SessionState::Ready {
            let message = match self.framed.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(e.into()),
                // EOF - client disconnected
                None => return Ok(()),
            };

            self.dispatch(message).await?;
            if !self.session.is_closed() {
                self.framed.flush().await?;
            }
        }
        Ok(())
    }

    /// Handles one decoded message. Replies are buffered in order.
    async fn dispatch(&mut self, message: FrontendMessage) -> Result<(), ConnectionError> {
        match message {
            FrontendMessage::Query(sql) => self.handle_query(&sql).await,
            FrontendMessage::Parse(msg) => self.handle_parse(msg).await,
            FrontendMessage::Bind(msg) => self.handle_bind(msg).await,
            FrontendMessage::Describe(msg) => self.handle_describe(msg).await,
            FrontendMessage::Execute(msg) => self.handle_execute(msg).await,
            FrontendMessage::Close(msg) => self.handle_close(msg).await,
            FrontendMessage::Sync => self.ready_for_query(TransactionStatus::Idle).await,
            FrontendMessage::Flush => Ok(()),
            FrontendMessage::Terminate => {
                debug!(pid = self.session.pid(), "terminate");
                self.session.close();
                Ok(())
            }
            FrontendMessage::Password(_) => {
                self.fail(
                    sql_state::PROTOCOL_VIOLATION,
                    "unexpected password message".to_string(),
                )
                .await
            }
            FrontendMessage::Unknown(tag) => {
                self.fail(
                    sql_state::PROTOCOL_VIOLATION,
                    format!("invalid frontend message type {}", tag),
                )
                .await
            }
            FrontendMessage::InvalidEncoding(tag) => {
                debug!(pid = self.session.pid(), tag, "invalid UTF-8 in message");
                self.fail(
                    sql_state::CHARACTER_NOT_IN_REPERTOIRE,
                    "invalid byte sequence for encoding \"UTF8\"".to_string(),
                )
                .await
            }
        }
    }

    /// Handle a query from the client (Simple Query Protocol).
    ///
    /// Each statement is resolved completely before anything is written, so
    /// a failing statement never leaves a partial result on the wire.
    async fn handle_query(&mut self, sql: &str) -> Result<(), ConnectionError> {
        debug!(pid = self.session.pid(), sql, "query");

        let statements = self.engine.split_statements(sql);
        if statements.is_empty() {
            self.send(BackendMessage::EmptyQueryResponse).await?;
            return self.ready_for_query(TransactionStatus::Idle).await;
        }

        let ctx = self.session.context();
        let mut status = TransactionStatus::Idle;
        for statement in &statements {
            match self.engine.execute(statement, &ctx).await {
                Ok(result) => self.send_result(result).await?,
                Err(err) => {
                    debug!(pid = self.session.pid(), error = %err, "statement failed");
                    self.send(err.to_error_info().into_error_response()).await?;
                    status = TransactionStatus::Failed;
                    break;
                }
            }
        }
        self.ready_for_query(status).await
    }

    /// Handle a Parse message - store a prepared statement.
    async fn handle_parse(&mut self, msg: ParseMessage) -> Result<(), ConnectionError> {
        debug!(
            pid = self.session.pid(),
            statement = %msg.statement_name,
            sql = %msg.query,
            "parse"
        );

        if !msg.param_types.is_empty() {
            return self.fail_parameters().await;
        }

        self.session.put_statement(msg.statement_name, msg.query);
        self.send(BackendMessage::ParseComplete).await
    }

    /// Handle a Bind message - create a portal over a statement.
    async fn handle_bind(&mut self, msg: BindMessage) -> Result<(), ConnectionError> {
        debug!(
            pid = self.session.pid(),
            portal = %msg.portal_name,
            statement = %msg.statement_name,
            "bind"
        );

        if self.session.get_statement(&msg.statement_name).is_none() {
            return self
                .fail(
                    sql_state::INVALID_SQL_STATEMENT_NAME,
                    unknown_statement(&msg.statement_name),
                )
                .await;
        }
        if !msg.param_values.is_empty() {
            return self.fail_parameters().await;
        }

        // Result formats are ignored: results are always text.
        self.session.put_portal(msg.portal_name, msg.statement_name);
        self.send(BackendMessage::BindComplete).await
    }

    /// Handle a Describe message. Anything that cannot be resolved or
    /// described yields NoData.
    async fn handle_describe(&mut self, msg: DescribeMessage) -> Result<(), ConnectionError> {
        debug!(
            pid = self.session.pid(),
            target = ?msg.target_type,
            name = %msg.name,
            "describe"
        );

        let sql = match msg.target_type {
            DescribeTarget::Statement => {
                let sql = self
                    .session
                    .get_statement(&msg.name)
                    .map(|stmt| stmt.sql.clone());
                if sql.is_some() {
                    self.send(BackendMessage::ParameterDescription {
                        param_types: Vec::new(),
                    })
                    .await?;
                }
                sql
            }
            DescribeTarget::Portal => self.session.portal_sql(&msg.name).ok().map(str::to_string),
        };

        let columns = match sql {
            Some(sql) if !self.engine.split_statements(&sql).is_empty() => {
                let ctx = self.session.context();
                self.engine.describe(&sql, &ctx).await.unwrap_or_default()
            }
            _ => Vec::new(),
        };

        if columns.is_empty() {
            self.send(BackendMessage::NoData).await
        } else {
            self.send(BackendMessage::RowDescription {
                fields: columns.iter().map(|c| c.to_field_description()).collect(),
            })
            .await
        }
    }

    /// Handle an Execute message - run the portal's statement. The row
    /// limit is ignored and no ReadyForQuery follows a success.
    async fn handle_execute(&mut self, msg: ExecuteMessage) -> Result<(), ConnectionError> {
        debug!(
            pid = self.session.pid(),
            portal = %msg.portal_name,
            max_rows = msg.max_rows,
            "execute"
        );

        let sql = match self.session.portal_sql(&msg.portal_name) {
            Ok(sql) => sql.to_string(),
            Err(PortalLookupError::UnknownPortal) => {
                return self
                    .fail(
                        sql_state::INVALID_CURSOR_NAME,
                        format!("portal \"{}\" does not exist", msg.portal_name),
                    )
                    .await;
            }
            Err(PortalLookupError::UnknownStatement) => {
                let statement_name = self
                    .session
                    .get_portal(&msg.portal_name)
                    .map(|p| p.statement_name.clone())
                    .unwrap_or_default();
                return self
                    .fail(
                        sql_state::INVALID_SQL_STATEMENT_NAME,
                        unknown_statement(&statement_name),
                    )
                    .await;
            }
        };

        // Comment-only text is empty, exactly as in a simple Query.
        if self.engine.split_statements(&sql).is_empty() {
            return self.send(BackendMessage::EmptyQueryResponse).await;
        }

        let ctx = self.session.context();
        match self.engine.execute(&sql, &ctx).await {
            Ok(result) => self.send_result(result).await,
            Err(err) => {
                debug!(pid = self.session.pid(), error = %err, "execute failed");
                self.send(err.to_error_info().into_error_response()).await?;
                self.ready_for_query(TransactionStatus::Failed).await
            }
        }
    }

    /// Handle a Close message. Closing something absent is not an error.
    async fn handle_close(&mut self, msg: CloseMessage) -> Result<(), ConnectionError> {
        debug!(
            pid = self.session.pid(),
            target = ?msg.target_type,
            name = %msg.name,
            "close"
        );

        match msg.target_type {
            CloseTarget::Statement => self.session.close_statement(&msg.name),
            CloseTarget::Portal => self.session.close_portal(&msg.name),
        }
        self.send(BackendMessage::CloseComplete).await
    }

    /// RowDescription (when there are columns), DataRows, notices, then
    /// CommandComplete.
    async fn send_result(&mut self, result: QueryResult) -> Result<(), ConnectionError> {
        let QueryResult {
            columns,
            rows,
            tag,
            notices,
        } = result;

        if !columns.is_empty() {
            self.send(BackendMessage::RowDescription {
                fields: columns.iter().map(|c| c.to_field_description()).collect(),
            })
            .await?;
        }
        for row in rows {
            self.send(BackendMessage::DataRow {
                values: row.into_iter().map(|cell| cell.into_data_value()).collect(),
            })
            .await?;
        }
        for notice in notices {
            self.send(notice.into_notice_response()).await?;
        }
        self.send(BackendMessage::CommandComplete { tag }).await
    }

    /// Reports a recoverable error: ErrorResponse then ReadyForQuery(Error).
    async fn fail(&mut self, code: &str, message: String) -> Result<(), ConnectionError> {
        self.fail_with(ErrorInfo::new(Severity::Error, code, message))
            .await
    }

    async fn fail_with(&mut self, info: ErrorInfo) -> Result<(), ConnectionError> {
        debug!(pid = self.session.pid(), code = %info.code, reason = %info.message, "error");
        self.send(info.into_error_response()).await?;
        self.ready_for_query(TransactionStatus::Failed).await
    }

    async fn fail_parameters(&mut self) -> Result<(), ConnectionError> {
        let info = ErrorInfo::new(
            Severity::Error,
            sql_state::FEATURE_NOT_SUPPORTED,
            "parameters not supported: statements must not contain $n placeholders",
        )
        .with_hint("Inline the values into the statement text.");
        self.fail_with(info).await
    }

    async fn ready_for_query(&mut self, status: TransactionStatus) -> Result<(), ConnectionError> {
        self.send(BackendMessage::ReadyForQuery { status }).await
    }

    /// Buffers a message. Writes on a closed session are dropped.
    async fn send(&mut self, message: BackendMessage) -> Result<(), ConnectionError> {
        if self.session.is_closed() {
            return Ok(());
        }
        self.framed.feed(message).await?;
        Ok(())
    }
}

fn unknown_statement(name: &str) -> String {
    format!("prepared statement \"{name}\" does not exist")
}
