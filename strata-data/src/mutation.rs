use crate::descriptor::{Descriptor, Entry, FieldValue, ASSIGN_MARKER};
use crate::error::DataError;
use crate::predicate::Predicate;
use crate::schema::FieldDef;
use crate::value::Value;

/// A compiled `SET` + `WHERE` pair for update operations.
///
/// Assignment placeholders are named `s0, s1, ...` and predicate
/// placeholders `p0, p1, ...`, so the two sets are disjoint by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPlan {
    assignments: Predicate,
    predicate: Predicate,
}

impl MutationPlan {
    /// Compile a combined set-and-where descriptor.
    ///
    /// Entries whose key starts with [`ASSIGN_MARKER`] become `SET` targets
    /// after marker removal; the bare name must match a mutable schema
    /// field. All other entries feed the predicate compiler. A descriptor
    /// with no assignments fails with `NoAssignments` before any SQL is
    /// issued.
    pub fn compile(descriptor: &Descriptor, fields: &[FieldDef]) -> Result<Self, DataError> {
        let mut set_clause = String::new();
        let mut set_params: Vec<(String, Value)> = Vec::new();
        let mut where_entries: Vec<Entry> = Vec::new();

        for entry in descriptor.entries() {
            let Some(name) = entry.key.strip_prefix(ASSIGN_MARKER) else {
                where_entries.push(entry.clone());
                continue;
            };
            let field = fields
                .iter()
                .find(|f| f.name == name)
                .ok_or_else(|| DataError::UnknownField {
                    field: name.to_string(),
                })?;
            if !field.mutable {
                return Err(DataError::ImmutableField {
                    field: name.to_string(),
                });
            }
            let value = match &entry.value {
                FieldValue::Single(value) => value.clone(),
                FieldValue::Many(_) => {
                    return Err(DataError::UnsupportedValue {
                        field: name.to_string(),
                        reason: "collection as assignment value",
                    })
                }
            };
            if !set_clause.is_empty() {
                set_clause.push_str(", ");
            }
            let placeholder = format!("s{}", set_params.len());
            set_clause.push_str(&format!("{} = @{placeholder}", field.column));
            set_params.push((placeholder, value));
        }

        if set_params.is_empty() {
            return Err(DataError::NoAssignments);
        }

        let predicate = Predicate::compile_entries(&where_entries, fields)?;
        let assignments = Predicate::raw(set_clause, set_params)?;
        Ok(Self {
            assignments,
            predicate,
        })
    }

    /// The assignment list, e.g. `name = @s0, age = @s1`.
    pub fn assignments(&self) -> &Predicate {
        &self.assignments
    }

    /// The filter predicate; may be empty (unfiltered update).
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}
