//! Per-connection session state.

use std::collections::HashMap;

use crate::config::Credentials;
use crate::engine::SessionContext;
use crate::protocol::StartupParameters;

/// Database used when neither the client nor the configuration names one
/// and no user is known.
pub const FALLBACK_DATABASE: &str = "postgres";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingStartup,
    AwaitingPassword,
    Ready,
    /// Terminal: nothing more is read or written.
    Closed,
}

/// A prepared statement stored on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub sql: String,
}

/// A portal stored on the session.
///
/// A portal refers to its statement by name, so re-parsing that name is
/// observed by the portal at Describe/Execute time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portal {
    pub statement_name: String,
}

/// Why a portal could not be resolved to SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalLookupError {
    UnknownPortal,
    UnknownStatement,
}

/// State owned by one connection for its whole life.
///
/// NOTE: No synchronization needed - a session is owned by a single task.
#[derive(Debug)]
pub struct Session {
    pid: i32,
    secret_key: i32,
    state: SessionState,
    user: String,
    database: String,
    application_name: Option<String>,
    expected: Option<Credentials>,
    /// Key "" is the unnamed statement.
    statements: HashMap<String, PreparedStatement>,
    /// Key "" is the unnamed portal.
    portals: HashMap<String, Portal>,
}

impl Session {
    pub fn new(pid: i32, secret_key: i32) -> Self {
        Self {
            pid,
            secret_key,
            state: SessionState::AwaitingStartup,
            user: String::new(),
            database: String::new(),
            application_name: None,
            expected: None,
            statements: HashMap::new(),
            portals: HashMap::new(),
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Records the startup parameters. The database is the client's choice,
    /// else `default_database`, else the user name.
    pub fn start(&mut self, params: &StartupParameters, default_database: Option<&str>) {
        self.user = params.user.clone();
        self.database = params
            .database
            .as_deref()
            .or(default_database)
            .or(Some(params.user.as_str()).filter(|u| !u.is_empty()))
            .unwrap_or(FALLBACK_DATABASE)
            .to_string();
        self.application_name = params.application_name.clone();
    }

    /// Moves to AwaitingPassword, remembering the credentials to check.
    pub fn await_password(&mut self, expected: Credentials) {
        self.expected = Some(expected);
        self.state = SessionState::AwaitingPassword;
    }

    /// Whether `password` matches the expected one.
    pub fn check_password(&self, password: &str) -> bool {
        self.expected
            .as_ref()
            .is_some_and(|expected| expected.password == password)
    }

    /// Moves to Ready; the session is authenticated from here on.
    pub fn mark_ready(&mut self) {
        self.state = SessionState::Ready;
    }

    /// Moves to Closed and drops every statement and portal.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.statements.clear();
        self.portals.clear();
    }

    pub fn context(&self) -> SessionContext {
        SessionContext {
            database: self.database.clone(),
            user: self.user.clone(),
            application_name: self.application_name.clone(),
        }
    }

    /// Stores a prepared statement, replacing one with the same name.
    pub fn put_statement(&mut self, name: String, sql: String) {
        self.statements.insert(name, PreparedStatement { sql });
    }

    pub fn get_statement(&self, name: &str) -> Option<&PreparedStatement> {
        self.statements.get(name)
    }

    /// Removes a statement if present. Portals bound to it are kept and
    /// fail when executed.
    pub fn close_statement(&mut self, name: &str) {
        self.statements.remove(name);
    }

    /// Stores a portal, replacing one with the same name.
    pub fn put_portal(&mut self, name: String, statement_name: String) {
        self.portals.insert(name, Portal { statement_name });
    }

    pub fn get_portal(&self, name: &str) -> Option<&Portal> {
        self.portals.get(name)
    }

    pub fn close_portal(&mut self, name: &str) {
        self.portals.remove(name);
    }

    /// Resolves a portal to the SQL of its statement.
    pub fn portal_sql(&self, name: &str) -> Result<&str, PortalLookupError> {
        let portal = self
            .get_portal(name)
            .ok_or(PortalLookupError::UnknownPortal)?;
        self.get_statement(&portal.statement_name)
            .map(|stmt| stmt.sql.as_str())
            .ok_or(PortalLookupError::UnknownStatement)
    }
}
