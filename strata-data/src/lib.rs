pub mod descriptor;
pub mod error;
pub mod mutation;
pub mod page;
pub mod plan;
pub mod predicate;
pub mod schema;
pub mod scope;
pub mod statement;
pub mod value;

pub use descriptor::{DbParams, Descriptor, Direction, FieldValue, ASSIGN_MARKER};
pub use error::DataError;
pub use mutation::MutationPlan;
pub use page::{Page, PageRequest, SortOrder, SortSpec};
pub use predicate::Predicate;
pub use schema::{FieldDef, TableSchema};
pub use scope::{CloseAction, ExecResult, ScopeLifecycle, ScopeState};
pub use statement::{Dialect, Statement};
pub use value::Value;

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        DataError, Descriptor, Dialect, FieldDef, Page, PageRequest, Predicate, SortSpec,
        TableSchema, Value,
    };
}
