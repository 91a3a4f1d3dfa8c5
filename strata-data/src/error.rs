use crate::scope::ScopeState;

/// Errors that can occur in the data layer.
///
/// The compiler-stage variants (`EmptyDescriptor` through `MissingOrderBy`)
/// are detected before any SQL is issued and indicate a programming error by
/// the caller; they are never retried. `Connection` and `Driver` wrap
/// failures reported by the database and are surfaced unmodified.
#[derive(Debug)]
pub enum DataError {
    /// A raw input resolved to zero usable fields.
    EmptyDescriptor,
    /// A tagged parameter carries a direction the layer cannot bind.
    UnsupportedDirection { name: String, direction: &'static str },
    /// The same field name appears twice in one descriptor.
    DuplicateField { field: String },
    /// A descriptor field has no counterpart in the target schema.
    UnknownField { field: String },
    /// A field value cannot be compiled in its position.
    UnsupportedValue { field: String, reason: &'static str },
    /// Two predicate fragments declare the same placeholder name.
    PlaceholderCollision { placeholder: String },
    /// A SQL fragment references a placeholder with no bound parameter.
    UnboundPlaceholder { placeholder: String },
    /// An assignment targets a field the schema marks as immutable.
    ImmutableField { field: String },
    /// A mutation descriptor contains no `set_` assignments.
    NoAssignments,
    /// A model-keyed operation ran against a schema with no key fields set.
    MissingKey { table: &'static str },
    /// An identifier failed validation before being spliced into SQL.
    InvalidIdentifier { kind: &'static str, ident: String },
    /// Page size must be greater than zero.
    InvalidPageSize { size: u64 },
    /// Paging without an explicit ordering has undefined offset semantics.
    MissingOrderBy,
    /// An operation is illegal in the scope's current lifecycle state.
    Scope {
        operation: &'static str,
        state: ScopeState,
    },
    /// The configured dialect has no compiled-in driver.
    UnsupportedDialect { dialect: String },
    /// Opening the physical connection failed. Never retried.
    Connection(Box<dyn std::error::Error + Send + Sync>),
    /// A failure reported by the underlying database call.
    Driver(Box<dyn std::error::Error + Send + Sync>),
    /// A single-row lookup matched nothing.
    NotFound(String),
}

impl DataError {
    /// Construct a `Driver` variant from any error type.
    ///
    /// Used by backend crates to wrap driver-specific errors.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Driver(Box::new(err))
    }

    /// Construct a `Connection` variant from any error type.
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Connection(Box::new(err))
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::EmptyDescriptor => write!(f, "Descriptor has no resolvable fields"),
            DataError::UnsupportedDirection { name, direction } => {
                write!(f, "Parameter '{name}' has unsupported direction {direction}")
            }
            DataError::DuplicateField { field } => {
                write!(f, "Duplicate descriptor field: {field}")
            }
            DataError::UnknownField { field } => {
                write!(f, "Field not present in schema: {field}")
            }
            DataError::UnsupportedValue { field, reason } => {
                write!(f, "Unsupported value for field '{field}': {reason}")
            }
            DataError::PlaceholderCollision { placeholder } => {
                write!(f, "Placeholder declared twice: {placeholder}")
            }
            DataError::UnboundPlaceholder { placeholder } => {
                write!(f, "Placeholder has no bound parameter: {placeholder}")
            }
            DataError::ImmutableField { field } => {
                write!(f, "Field is not mutable: {field}")
            }
            DataError::NoAssignments => {
                write!(f, "Mutation descriptor contains no assignments")
            }
            DataError::MissingKey { table } => {
                write!(f, "No key fields available for table {table}")
            }
            DataError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
            DataError::InvalidPageSize { size } => {
                write!(f, "Page size must be > 0, got {size}")
            }
            DataError::MissingOrderBy => {
                write!(f, "Page request has no order-by fields")
            }
            DataError::Scope { operation, state } => {
                write!(f, "Operation '{operation}' is illegal in scope state {state}")
            }
            DataError::UnsupportedDialect { dialect } => {
                write!(f, "Unsupported SQL dialect: {dialect}")
            }
            DataError::Connection(err) => write!(f, "Connection error: {err}"),
            DataError::Driver(err) => write!(f, "Database error: {err}"),
            DataError::NotFound(msg) => write!(f, "Not found: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Connection(err) | DataError::Driver(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
