use crate::error::DataError;
use crate::value::Value;

/// Target SQL dialect.
///
/// Affects positional placeholder style and transaction control statements.
/// Which dialects can actually open a connection depends on the compiled-in
/// drivers; an unimplemented dialect fails at open time, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default, tests).
    Generic,
    /// SQLite-style `?` placeholders.
    Sqlite,
    /// MySQL-style `?` placeholders, `START TRANSACTION`.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    /// Parse a configured dialect name.
    pub fn parse(name: &str) -> Result<Dialect, DataError> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            _ => Err(DataError::UnsupportedDialect {
                dialect: name.to_string(),
            }),
        }
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    pub fn begin_sql(self) -> &'static str {
        match self {
            Dialect::MySql => "START TRANSACTION",
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => "BEGIN",
        }
    }

    pub fn commit_sql(self) -> &'static str {
        "COMMIT"
    }

    pub fn rollback_sql(self) -> &'static str {
        "ROLLBACK"
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dialect::Generic => "generic",
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        };
        write!(f, "{name}")
    }
}

/// A compiled SQL statement: text with named `@placeholder` tokens plus the
/// ordered parameter list backing them.
///
/// Named tokens keep diagnostics and collision checks readable; the backend
/// lowers them to the dialect's positional placeholders just before
/// execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<(String, Value)>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<(String, Value)>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Lower named placeholders to the dialect's positional style.
    ///
    /// Values are emitted in order of appearance in the SQL text; a name
    /// referenced twice binds its value twice. A token with no backing
    /// parameter fails with `UnboundPlaceholder`.
    pub fn lower(&self, dialect: Dialect) -> Result<(String, Vec<Value>), DataError> {
        let mut sql = String::with_capacity(self.sql.len());
        let mut values = Vec::with_capacity(self.params.len());
        let mut chars = self.sql.char_indices().peekable();
        let mut in_string = false;
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                in_string = !in_string;
                sql.push(c);
                continue;
            }
            if in_string || c != '@' {
                sql.push(c);
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while let Some(&(j, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    end = j + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            if end == start {
                sql.push(c);
                continue;
            }
            let name = &self.sql[start..end];
            let value = self
                .params
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| DataError::UnboundPlaceholder {
                    placeholder: name.to_string(),
                })?;
            values.push(value);
            sql.push_str(&dialect.placeholder(values.len()));
        }
        Ok((sql, values))
    }
}

/// Extract placeholder names from a SQL fragment, in order of appearance.
/// Tokens inside single-quoted literals are ignored.
pub fn scan_placeholders(sql: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut current = String::new();
    let mut in_placeholder = false;
    let mut in_string = false;
    for c in sql.chars() {
        if c == '\'' {
            in_string = !in_string;
            in_placeholder = false;
            continue;
        }
        if in_string {
            continue;
        }
        if in_placeholder {
            if c.is_ascii_alphanumeric() || c == '_' {
                current.push(c);
                continue;
            }
            if !current.is_empty() {
                names.push(std::mem::take(&mut current));
            }
            in_placeholder = false;
        }
        if c == '@' {
            in_placeholder = true;
            current.clear();
        }
    }
    if in_placeholder && !current.is_empty() {
        names.push(current);
    }
    names
}

/// Validate a (possibly dotted) SQL identifier.
pub(crate) fn is_valid_identifier(ident: &str, allow_star: bool) -> bool {
    if ident.is_empty() {
        return false;
    }
    let parts: Vec<&str> = ident.split('.').collect();
    for (idx, part) in parts.iter().enumerate() {
        if allow_star && *part == "*" {
            return idx + 1 == parts.len();
        }
        if !is_valid_segment(part) {
            return false;
        }
    }
    true
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn check_identifier(
    ident: &str,
    allow_star: bool,
    kind: &'static str,
) -> Result<(), DataError> {
    if !is_valid_identifier(ident, allow_star) {
        return Err(DataError::InvalidIdentifier {
            kind,
            ident: ident.to_string(),
        });
    }
    Ok(())
}
