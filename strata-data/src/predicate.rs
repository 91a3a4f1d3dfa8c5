use crate::descriptor::{Descriptor, Entry, FieldValue};
use crate::error::DataError;
use crate::schema::FieldDef;
use crate::value::Value;

/// Comparison operator selected by a descriptor key suffix.
///
/// `{"age__ge": 18, "age__lt": 65}` compiles to a range predicate; the two
/// entries have distinct keys, so the descriptor uniqueness invariant holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

impl Comparison {
    fn from_suffix(suffix: &str) -> Option<Comparison> {
        match suffix {
            "eq" => Some(Comparison::Eq),
            "ne" => Some(Comparison::Ne),
            "gt" => Some(Comparison::Gt),
            "ge" => Some(Comparison::Ge),
            "lt" => Some(Comparison::Lt),
            "le" => Some(Comparison::Le),
            "like" => Some(Comparison::Like),
            _ => None,
        }
    }

    fn sql_op(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Like => "LIKE",
        }
    }
}

/// A SQL boolean expression plus its bound parameters.
///
/// The clause references parameters through named `@placeholder` tokens;
/// every placeholder in the clause has exactly one entry in `params` and
/// vice versa for compiled predicates. Raw fragments are carried verbatim
/// with the caller's own parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clause: String,
    params: Vec<(String, Value)>,
}

impl Predicate {
    /// A predicate that matches everything (no `WHERE` clause emitted).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile a descriptor against a schema field list.
    ///
    /// Fields compile in descriptor order, joined with `AND`. Collection
    /// values expand to `IN` with one placeholder per element; null values
    /// compile to `IS NULL` (equality to null is never true in SQL and must
    /// not produce a bound null parameter).
    pub fn compile(descriptor: &Descriptor, fields: &[FieldDef]) -> Result<Self, DataError> {
        Self::compile_entries(descriptor.entries(), fields)
    }

    pub(crate) fn compile_entries(
        entries: &[Entry],
        fields: &[FieldDef],
    ) -> Result<Self, DataError> {
        let mut clause = String::new();
        let mut params: Vec<(String, Value)> = Vec::new();
        for entry in entries {
            let (column, op) = resolve_column(&entry.key, fields)?;
            if !clause.is_empty() {
                clause.push_str(" AND ");
            }
            match &entry.value {
                FieldValue::Single(Value::Null) => match op {
                    Comparison::Eq => {
                        clause.push_str(column);
                        clause.push_str(" IS NULL");
                    }
                    Comparison::Ne => {
                        clause.push_str(column);
                        clause.push_str(" IS NOT NULL");
                    }
                    _ => {
                        return Err(DataError::UnsupportedValue {
                            field: entry.key.clone(),
                            reason: "null with an ordering operator",
                        })
                    }
                },
                FieldValue::Single(value) => {
                    let name = format!("p{}", params.len());
                    clause.push_str(&format!("{column} {} @{name}", op.sql_op()));
                    params.push((name, value.clone()));
                }
                FieldValue::Many(values) => {
                    if op != Comparison::Eq {
                        return Err(DataError::UnsupportedValue {
                            field: entry.key.clone(),
                            reason: "collection with a comparison operator",
                        });
                    }
                    if values.is_empty() {
                        return Err(DataError::UnsupportedValue {
                            field: entry.key.clone(),
                            reason: "empty collection",
                        });
                    }
                    let mut names = Vec::with_capacity(values.len());
                    for value in values {
                        let name = format!("p{}", params.len());
                        names.push(format!("@{name}"));
                        params.push((name, value.clone()));
                    }
                    clause.push_str(&format!("{column} IN ({})", names.join(", ")));
                }
            }
        }
        Ok(Self { clause, params })
    }

    /// A verbatim SQL fragment with caller-supplied named parameters.
    ///
    /// The fragment is passed through uncompiled. Parameter names must be
    /// unique; collisions with compiler-generated placeholders are detected
    /// when fragments are combined with [`Predicate::and`].
    pub fn raw(clause: impl Into<String>, params: Vec<(String, Value)>) -> Result<Self, DataError> {
        for (i, (name, _)) in params.iter().enumerate() {
            if params[..i].iter().any(|(other, _)| other == name) {
                return Err(DataError::PlaceholderCollision {
                    placeholder: name.clone(),
                });
            }
        }
        Ok(Self {
            clause: clause.into(),
            params,
        })
    }

    /// Conjoin two predicates, validating that their placeholder sets are
    /// disjoint.
    pub fn and(self, other: Predicate) -> Result<Self, DataError> {
        if self.is_empty() {
            return Ok(other);
        }
        if other.is_empty() {
            return Ok(self);
        }
        for (name, _) in &other.params {
            if self.params.iter().any(|(mine, _)| mine == name) {
                return Err(DataError::PlaceholderCollision {
                    placeholder: name.clone(),
                });
            }
        }
        let mut params = self.params;
        params.extend(other.params);
        Ok(Self {
            clause: format!("({}) AND ({})", self.clause, other.clause),
            params,
        })
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }
}

/// Resolve a descriptor key to a stored column name and operator.
///
/// The full key is tried against the schema first, so a field that happens
/// to contain `__` wins over suffix parsing.
fn resolve_column<'a>(
    key: &str,
    fields: &'a [FieldDef],
) -> Result<(&'a str, Comparison), DataError> {
    if let Some(field) = fields.iter().find(|f| f.name == key) {
        return Ok((field.column, Comparison::Eq));
    }
    if let Some((name, suffix)) = key.rsplit_once("__") {
        if let (Some(field), Some(op)) = (
            fields.iter().find(|f| f.name == name),
            Comparison::from_suffix(suffix),
        ) {
            return Ok((field.column, op));
        }
    }
    Err(DataError::UnknownField {
        field: key.to_string(),
    })
}
