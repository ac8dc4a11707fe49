//! Provider capabilities.
//!
//! A [`Dialect`] captures everything the command builders need to know about
//! a backend: placeholder style, identifier quoting, identity retrieval,
//! compound-statement support and the paging clause. Capabilities are data,
//! not type checks - resolved once per adapter from the [`DatabaseKind`].

use crate::config::DatabaseKind;

/// How a dialect expresses skip/take paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// Native `LIMIT n OFFSET m` clause.
    LimitOffset,
    /// Emulation via `ROW_NUMBER() OVER (...)` for providers without a
    /// native clause.
    RowNumber,
}

/// Parameter placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// Positional `?` placeholders (MySQL, SQLite).
    QuestionMark,
    /// Numbered `$1`, `$2`, ... placeholders (PostgreSQL).
    Dollar,
}

/// Capability description for one backend.
#[derive(Debug, Clone)]
pub struct Dialect {
    kind: DatabaseKind,
    param_style: ParamStyle,
    paging: PagingMode,
    supports_returning: bool,
    supports_compound_statements: bool,
    identity_expression: &'static str,
}

impl Dialect {
    /// Resolve the dialect for a backend.
    pub fn for_kind(kind: DatabaseKind) -> Self {
        match kind {
            DatabaseKind::Postgres => Self {
                kind,
                param_style: ParamStyle::Dollar,
                paging: PagingMode::LimitOffset,
                supports_returning: true,
                supports_compound_statements: true,
                identity_expression: "SELECT lastval()",
            },
            DatabaseKind::MySql => Self {
                kind,
                param_style: ParamStyle::QuestionMark,
                paging: PagingMode::LimitOffset,
                supports_returning: false,
                supports_compound_statements: true,
                identity_expression: "SELECT LAST_INSERT_ID()",
            },
            DatabaseKind::Sqlite => Self {
                kind,
                param_style: ParamStyle::QuestionMark,
                paging: PagingMode::LimitOffset,
                supports_returning: false,
                supports_compound_statements: false,
                identity_expression: "SELECT last_insert_rowid()",
            },
        }
    }

    /// Override the paging mode. Used for providers whose native clause is
    /// unavailable and by builder tests covering the emulated path.
    pub fn with_paging(mut self, paging: PagingMode) -> Self {
        self.paging = paging;
        self
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    pub fn param_style(&self) -> ParamStyle {
        self.param_style
    }

    pub fn paging(&self) -> PagingMode {
        self.paging
    }

    /// Whether INSERT can return generated values inline (`RETURNING *`).
    pub fn supports_returning(&self) -> bool {
        self.supports_returning
    }

    /// Whether multiple statements may be sent in one command.
    pub fn supports_compound_statements(&self) -> bool {
        self.supports_compound_statements
    }

    /// SQL fragment retrieving the last generated key on this connection.
    pub fn identity_expression(&self) -> &'static str {
        self.identity_expression
    }

    /// Placeholder for the parameter at 1-based `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self.param_style {
            ParamStyle::QuestionMark => "?".to_string(),
            ParamStyle::Dollar => format!("${index}"),
        }
    }

    /// Quote an identifier. Qualified names (`table.column`) are quoted per
    /// part.
    pub fn quote(&self, ident: &str) -> String {
        ident
            .split('.')
            .map(|part| self.quote_part(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_part(&self, part: &str) -> String {
        match self.kind {
            DatabaseKind::MySql => format!("`{}`", part.replace('`', "``")),
            DatabaseKind::Postgres | DatabaseKind::Sqlite => {
                format!("\"{}\"", part.replace('"', "\"\""))
            }
        }
    }
}
