//! Statement recognition.

use std::sync::LazyLock;

use regex::Regex;

use super::ParseError;
use super::split::{split_conjunction, split_top_level, strip_comments};

/// An identifier: double-quoted (exact) or bare (folded to lower case).
const IDENT: &str = r#"(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)"#;

static SELECT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^select\s+(?P<cols>.+?)\s+from\s+(?P<table>{IDENT}(?:\s*\.\s*{IDENT})?)(?:\s+where\s+(?P<where>.+?))?(?:\s+order\s+by\s+(?P<order>.+?))?(?:\s+limit\s+(?P<limit>\d+))?(?:\s+offset\s+(?P<offset>\d+))?$"
    ))
    .expect("valid SELECT regex")
});

static SELECT_VALUES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^select\s+(?P<items>.+)$").expect("valid regex"));

static ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?is)^(?P<expr>.+?)\s+as\s+(?P<alias>{IDENT})$")).expect("valid regex")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{IDENT}$")).expect("valid regex"));

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s)^(?P<col>{IDENT})\s*(?P<op><>|!=|<=|>=|=|<|>)\s*(?P<val>.+)$"
    ))
    .expect("valid regex")
});

static NULL_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^(?P<col>{IDENT})\s+is\s+(?P<not>not\s+)?null$"
    ))
    .expect("valid regex")
});

static ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?is)^(?P<col>{IDENT})(?:\s+(?P<dir>asc|desc))?$")).expect("valid regex")
});

static STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^'((?:[^']|'')*)'$").expect("valid regex"));

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+$").expect("valid regex"));

static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[+-]?(?:\d+\.\d*|\.\d+|\d+(?:\.\d*)?e[+-]?\d+)$").expect("valid regex")
});

static FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?P<call>version|current_database|current_schema)\s*\(\s*\)|(?P<bare>current_user|session_user|current_catalog|current_schema|user))$")
        .expect("valid regex")
});

static COUNT_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^count\s*\(\s*\*\s*\)$").expect("valid regex"));

static SHOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^show\s+(?P<name>[A-Za-z_][A-Za-z0-9_.]*)$").expect("valid regex")
});

static SET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^set\s+(?:(?:session|local)\s+)?(?P<name>time\s+zone|[A-Za-z_][A-Za-z0-9_.]*)")
        .expect("valid regex")
});

/// A recognized statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `SELECT` without `FROM`: one row of constants and session functions.
    Values(Vec<SelectItem>),
    /// `SELECT … FROM [schema.]table …`
    Select(Select),
    /// `SHOW name`
    Show(String),
    /// `SET name …`; accepted but not applied.
    Set(String),
    /// `BEGIN` / `START TRANSACTION`
    Begin,
    /// `COMMIT` / `END`
    Commit,
    /// `ROLLBACK` / `ABORT`
    Rollback,
}

/// An item of a FROM-less select list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: ValueExpr,
    pub alias: Option<String>,
}

impl SelectItem {
    /// Output column name, following PostgreSQL's naming of unaliased items.
    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expr {
            ValueExpr::Literal(_) => "?column?".to_string(),
            ValueExpr::Function(f) => f.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Literal(Literal),
    Function(Function),
}

/// Session information functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Version,
    CurrentDatabase,
    CurrentSchema,
    CurrentUser,
    SessionUser,
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::Version => "version",
            Function::CurrentDatabase => "current_database",
            Function::CurrentSchema => "current_schema",
            Function::CurrentUser => "current_user",
            Function::SessionUser => "session_user",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    /// Kept as written; compared numerically.
    Decimal(String),
    String(String),
    Bool(bool),
    Null,
}

impl Literal {
    /// Parses a single SQL literal.
    pub fn parse(text: &str) -> Option<Literal> {
        let text = text.trim();
        if let Some(caps) = STRING.captures(text) {
            return Some(Literal::String(caps[1].replace("''", "'")));
        }
        if INTEGER.is_match(text) {
            return Some(match text.parse::<i64>() {
                Ok(n) => Literal::Integer(n),
                Err(_) => Literal::Decimal(text.trim_start_matches('+').to_string()),
            });
        }
        if DECIMAL.is_match(text) {
            return Some(Literal::Decimal(text.trim_start_matches('+').to_string()));
        }
        match text.to_ascii_lowercase().as_str() {
            "true" => Some(Literal::Bool(true)),
            "false" => Some(Literal::Bool(false)),
            "null" => Some(Literal::Null),
            _ => None,
        }
    }

    /// Numeric value, if the literal is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Integer(n) => Some(*n as f64),
            Literal::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// `SELECT … FROM [schema.]table [WHERE …] [ORDER BY …] [LIMIT n] [OFFSET n]`
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub projection: Projection,
    pub schema: Option<String>,
    pub table: String,
    pub filters: Vec<Condition>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Select {
    /// Display name of the table as the user wrote it (after folding).
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.table),
            None => self.table.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*`
    Wildcard,
    /// `col [AS alias], …`
    Columns(Vec<ProjectionItem>),
    /// `count(*) [AS alias]`
    Count { alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub column: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: String,
        op: CompareOp,
        value: Literal,
    },
    IsNull {
        column: String,
        negated: bool,
    },
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Compare { column, .. } | Condition::IsNull { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Verbs that would modify data; rejected with a read-only error.
const WRITE_VERBS: &[&str] = &[
    "insert", "update", "delete", "merge", "create", "drop", "alter", "truncate", "grant",
    "revoke", "copy", "comment", "vacuum",
];

/// Recognizes one statement. Comments and a trailing `;` are ignored.
pub fn parse(sql: &str) -> Result<Statement, ParseError> {
    let sql = strip_comments(sql);
    let sql = sql.trim().trim_end_matches(';').trim();

    let keyword = sql
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match keyword.as_str() {
        "" => Err(ParseError::Syntax(String::new())),
        "select" => parse_select(sql),
        "show" => parse_show(sql),
        "set" => SET
            .captures(sql)
            .map(|caps| {
                let name = caps["name"].split_whitespace().collect::<Vec<_>>().join("");
                Statement::Set(name.to_ascii_lowercase())
            })
            .ok_or_else(|| ParseError::Syntax(sql.to_string())),
        "begin" | "start" => Ok(Statement::Begin),
        "commit" | "end" => Ok(Statement::Commit),
        "rollback" | "abort" => Ok(Statement::Rollback),
        verb if WRITE_VERBS.contains(&verb) => Err(ParseError::ReadOnly(verb.to_ascii_uppercase())),
        "with" | "explain" | "values" | "table" | "prepare" | "execute" | "deallocate"
        | "declare" | "fetch" | "listen" | "notify" => Err(ParseError::Unsupported(format!(
            "{} is not supported",
            keyword.to_ascii_uppercase()
        ))),
        _ => {
            let near = sql.split_whitespace().next().unwrap_or_default();
            Err(ParseError::Syntax(near.to_string()))
        }
    }
}

fn parse_show(sql: &str) -> Result<Statement, ParseError> {
    let caps = SHOW
        .captures(sql)
        .ok_or_else(|| ParseError::Syntax(sql.to_string()))?;
    let name = caps["name"].to_ascii_lowercase();
    if name == "all" {
        return Err(ParseError::Unsupported("SHOW ALL is not supported".to_string()));
    }
    Ok(Statement::Show(name))
}

fn parse_select(sql: &str) -> Result<Statement, ParseError> {
    if let Some(caps) = SELECT_FROM.captures(sql) {
        return parse_select_from(&caps).map(Statement::Select);
    }

    let caps = SELECT_VALUES
        .captures(sql)
        .ok_or_else(|| ParseError::Syntax(sql.to_string()))?;
    let items = split_top_level(&caps["items"], b',')
        .into_iter()
        .map(parse_select_item)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Statement::Values(items))
}

fn parse_select_from(caps: &regex::Captures<'_>) -> Result<Select, ParseError> {
    let (schema, table) = parse_table_ref(&caps["table"]);
    let projection = parse_projection(&caps["cols"])?;

    let filters = match caps.name("where") {
        Some(m) => split_conjunction(m.as_str())
            .into_iter()
            .map(parse_condition)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let order_by = caps
        .name("order")
        .map(|m| -> Result<OrderBy, ParseError> {
            let order = ORDER.captures(m.as_str().trim()).ok_or_else(|| {
                ParseError::Unsupported(format!("unsupported ORDER BY: {}", m.as_str()))
            })?;
            Ok(OrderBy {
                column: normalize_ident(&order["col"]),
                descending: order
                    .name("dir")
                    .is_some_and(|d| d.as_str().eq_ignore_ascii_case("desc")),
            })
        })
        .transpose()?;

    let parse_count = |name: &str| -> Result<Option<usize>, ParseError> {
        caps.name(name)
            .map(|m| {
                m.as_str()
                    .parse::<usize>()
                    .map_err(|_| ParseError::Syntax(m.as_str().to_string()))
            })
            .transpose()
    };

    Ok(Select {
        projection,
        schema,
        table,
        filters,
        order_by,
        limit: parse_count("limit")?,
        offset: parse_count("offset")?.unwrap_or(0),
    })
}

fn parse_table_ref(text: &str) -> (Option<String>, String) {
    let parts = split_top_level(text, b'.');
    match parts.as_slice() {
        [schema, table] => (Some(normalize_ident(schema)), normalize_ident(table)),
        _ => (None, normalize_ident(text)),
    }
}

fn parse_projection(text: &str) -> Result<Projection, ParseError> {
    if text.trim() == "*" {
        return Ok(Projection::Wildcard);
    }

    let items = split_top_level(text, b',');
    if let [item] = items.as_slice() {
        let (expr, alias) = split_alias(item);
        if COUNT_STAR.is_match(expr) {
            return Ok(Projection::Count { alias });
        }
    }

    items
        .into_iter()
        .map(|item| {
            let (expr, alias) = split_alias(item);
            if !IDENTIFIER.is_match(expr) {
                return Err(ParseError::Unsupported(format!(
                    "unsupported select list item: {expr}"
                )));
            }
            Ok(ProjectionItem {
                column: normalize_ident(expr),
                alias,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Projection::Columns)
}

fn parse_select_item(text: &str) -> Result<SelectItem, ParseError> {
    let (expr, alias) = split_alias(text);

    if let Some(literal) = Literal::parse(expr) {
        return Ok(SelectItem {
            expr: ValueExpr::Literal(literal),
            alias,
        });
    }

    if let Some(caps) = FUNCTION.captures(expr) {
        let name = caps
            .name("call")
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let function = match name.as_str() {
            "version" => Function::Version,
            "current_database" | "current_catalog" => Function::CurrentDatabase,
            "current_schema" => Function::CurrentSchema,
            "session_user" => Function::SessionUser,
            _ => Function::CurrentUser,
        };
        return Ok(SelectItem {
            expr: ValueExpr::Function(function),
            alias,
        });
    }

    if expr == "*" {
        return Err(ParseError::Unsupported(
            "SELECT * with no tables specified is not valid".to_string(),
        ));
    }
    if IDENTIFIER.is_match(expr) {
        return Err(ParseError::UndefinedColumn(normalize_ident(expr)));
    }
    Err(ParseError::Unsupported(format!(
        "unsupported expression: {expr}"
    )))
}

fn parse_condition(text: &str) -> Result<Condition, ParseError> {
    if let Some(caps) = NULL_TEST.captures(text) {
        return Ok(Condition::IsNull {
            column: normalize_ident(&caps["col"]),
            negated: caps.name("not").is_some(),
        });
    }

    let caps = COMPARISON
        .captures(text)
        .ok_or_else(|| ParseError::Unsupported(format!("unsupported condition: {text}")))?;
    let op = match &caps["op"] {
        "=" => CompareOp::Eq,
        "<>" | "!=" => CompareOp::NotEq,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::LtEq,
        ">" => CompareOp::Gt,
        _ => CompareOp::GtEq,
    };
    let value = Literal::parse(&caps["val"]).ok_or_else(|| {
        ParseError::Unsupported(format!("unsupported comparison value: {}", &caps["val"]))
    })?;
    Ok(Condition::Compare {
        column: normalize_ident(&caps["col"]),
        op,
        value,
    })
}

/// Splits `expr AS alias`; the alias is normalized.
fn split_alias(text: &str) -> (&str, Option<String>) {
    match ALIAS.captures(text) {
        Some(caps) => {
            let expr = caps.name("expr").map_or(text, |m| m.as_str().trim());
            (expr, Some(normalize_ident(&caps["alias"])))
        }
        None => (text.trim(), None),
    }
}

/// Quoted identifiers keep their case (with `""` unescaped); bare ones are
/// folded to lower case.
fn normalize_ident(text: &str) -> String {
    let text = text.trim();
    match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => text.to_ascii_lowercase(),
    }
}
