//! Statement planners: turn a schema plus compiled predicates into full
//! SQL statements with named placeholders.
//!
//! Identifiers spliced into SQL text (table names, columns, order-by
//! fields) are validated first; values only ever travel as parameters.

use crate::descriptor::{Descriptor, FieldValue};
use crate::error::DataError;
use crate::mutation::MutationPlan;
use crate::page::{PageRequest, SortSpec};
use crate::predicate::Predicate;
use crate::schema::TableSchema;
use crate::statement::{check_identifier, Statement};
use crate::value::Value;

/// `SELECT <columns> FROM <table> [WHERE ...] [ORDER BY ...]`.
///
/// `columns` defaults to `*`. Order-by fields resolve through the schema,
/// so callers order by field names, not raw column expressions.
pub fn select<S: TableSchema>(
    predicate: &Predicate,
    order_by: &[SortSpec],
    columns: Option<&[&str]>,
) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let projection = match columns {
        None => "*".to_string(),
        Some(cols) => {
            for col in cols {
                check_identifier(col, true, "column")?;
            }
            cols.join(", ")
        }
    };
    let mut sql = format!("SELECT {projection} FROM {}", S::table_name());
    push_where(&mut sql, predicate);
    push_order_by::<S>(&mut sql, order_by)?;
    Ok(Statement::new(sql, predicate.params().to_vec()))
}

/// `SELECT COUNT(*) FROM <table> [WHERE ...]` — the fast path used when the
/// caller's query has no custom projection.
pub fn count<S: TableSchema>(predicate: &Predicate) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let mut sql = format!("SELECT COUNT(*) FROM {}", S::table_name());
    push_where(&mut sql, predicate);
    Ok(Statement::new(sql, predicate.params().to_vec()))
}

/// Count the rows of an arbitrary SQL query by wrapping it in a subquery.
pub fn count_over(base_sql: &str, params: &[(String, Value)]) -> Statement {
    Statement::new(
        format!("SELECT COUNT(*) FROM ({base_sql}) AS counted"),
        params.to_vec(),
    )
}

/// The window query of one page: `SELECT ... ORDER BY ... LIMIT n OFFSET m`.
///
/// The request is validated here, so an unordered or zero-sized request
/// never reaches the database. Limit and offset are integer literals, not
/// parameters; they come from `u64` fields and cannot carry injection.
pub fn window<S: TableSchema>(
    predicate: &Predicate,
    request: &PageRequest,
) -> Result<Statement, DataError> {
    request.validate()?;
    check_identifier(S::table_name(), false, "table")?;
    let mut sql = format!("SELECT * FROM {}", S::table_name());
    push_where(&mut sql, predicate);
    push_order_by::<S>(&mut sql, &request.order_by)?;
    sql.push_str(&format!(" LIMIT {} OFFSET {}", request.size, request.offset()));
    Ok(Statement::new(sql, predicate.params().to_vec()))
}

/// Page over an arbitrary SQL query. Order-by fields are validated as
/// identifiers but not resolved against any schema, since the projection is
/// the caller's.
pub fn window_over(
    base_sql: &str,
    params: &[(String, Value)],
    request: &PageRequest,
) -> Result<Statement, DataError> {
    request.validate()?;
    let mut order = String::new();
    for spec in &request.order_by {
        check_identifier(&spec.field, false, "order-by")?;
        if !order.is_empty() {
            order.push_str(", ");
        }
        order.push_str(&format!("{} {}", spec.field, spec.order.sql()));
    }
    let sql = format!(
        "SELECT * FROM ({base_sql}) AS windowed ORDER BY {order} LIMIT {} OFFSET {}",
        request.size,
        request.offset()
    );
    Ok(Statement::new(sql, params.to_vec()))
}

/// `INSERT INTO <table> (cols) VALUES (@v0, ...)` from a resolved
/// descriptor.
///
/// Every descriptor field must exist in the schema. Key fields are skipped
/// when `include_keys` is false (generated keys), bound like any other
/// column otherwise (natural or caller-assigned keys).
pub fn insert<S: TableSchema>(
    descriptor: &Descriptor,
    include_keys: bool,
) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let fields = S::fields();
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut params: Vec<(String, Value)> = Vec::new();
    for entry in descriptor.entries() {
        let field = fields
            .iter()
            .find(|f| f.name == entry.key)
            .ok_or_else(|| DataError::UnknownField {
                field: entry.key.clone(),
            })?;
        if field.key && !include_keys {
            continue;
        }
        let value = match &entry.value {
            FieldValue::Single(value) => value.clone(),
            FieldValue::Many(_) => {
                return Err(DataError::UnsupportedValue {
                    field: entry.key.clone(),
                    reason: "collection as insert value",
                })
            }
        };
        let name = format!("v{}", params.len());
        columns.push(field.column);
        placeholders.push(format!("@{name}"));
        params.push((name, value));
    }
    if columns.is_empty() {
        return Err(DataError::EmptyDescriptor);
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        S::table_name(),
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok(Statement::new(sql, params))
}

/// Multi-row insert: `INSERT INTO <table> (cols) VALUES (@v0, ...), (...)`.
///
/// One statement covers the whole slice; callers chunk large batches so the
/// placeholder count stays under driver limits. Every descriptor must
/// resolve to the same column list as the first one, in the same order.
pub fn insert_many<S: TableSchema>(
    descriptors: &[Descriptor],
    include_keys: bool,
) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let fields = S::fields();
    let mut columns: Vec<&'static str> = Vec::new();
    let mut rows: Vec<String> = Vec::with_capacity(descriptors.len());
    let mut params: Vec<(String, Value)> = Vec::new();
    for (row, descriptor) in descriptors.iter().enumerate() {
        let mut row_columns = Vec::new();
        let mut placeholders = Vec::new();
        for entry in descriptor.entries() {
            let field = fields
                .iter()
                .find(|f| f.name == entry.key)
                .ok_or_else(|| DataError::UnknownField {
                    field: entry.key.clone(),
                })?;
            if field.key && !include_keys {
                continue;
            }
            let value = match &entry.value {
                FieldValue::Single(value) => value.clone(),
                FieldValue::Many(_) => {
                    return Err(DataError::UnsupportedValue {
                        field: entry.key.clone(),
                        reason: "collection as insert value",
                    })
                }
            };
            let name = format!("v{}", params.len());
            row_columns.push(field.column);
            placeholders.push(format!("@{name}"));
            params.push((name, value));
        }
        if row == 0 {
            if row_columns.is_empty() {
                return Err(DataError::EmptyDescriptor);
            }
            columns = row_columns;
        } else if row_columns != columns {
            return Err(DataError::UnsupportedValue {
                field: format!("row {row}"),
                reason: "batch rows must share one column list",
            });
        }
        rows.push(format!("({})", placeholders.join(", ")));
    }
    if rows.is_empty() {
        return Err(DataError::EmptyDescriptor);
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        S::table_name(),
        columns.join(", "),
        rows.join(", ")
    );
    Ok(Statement::new(sql, params))
}

/// `UPDATE <table> SET ... [WHERE ...]` from a compiled mutation plan.
pub fn update<S: TableSchema>(plan: &MutationPlan) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let mut sql = format!(
        "UPDATE {} SET {}",
        S::table_name(),
        plan.assignments().clause()
    );
    push_where(&mut sql, plan.predicate());
    let mut params = plan.assignments().params().to_vec();
    params.extend(plan.predicate().params().iter().cloned());
    Ok(Statement::new(sql, params))
}

/// Whole-model update: mutable fields present in the descriptor become the
/// `SET` list, key fields become the `WHERE` clause.
///
/// Immutable non-key fields (`created_at` and the like) are silently
/// skipped, so a model resolved with [`Descriptor::from_model`] updates
/// cleanly. Fails with `MissingKey` when the descriptor carries no key
/// field, since an unkeyed whole-model update would rewrite the table.
pub fn update_by_key<S: TableSchema>(descriptor: &Descriptor) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let fields = S::fields();
    let mut set_clause = String::new();
    let mut where_clause = String::new();
    let mut set_params: Vec<(String, Value)> = Vec::new();
    let mut where_params: Vec<(String, Value)> = Vec::new();
    for entry in descriptor.entries() {
        let field = fields
            .iter()
            .find(|f| f.name == entry.key)
            .ok_or_else(|| DataError::UnknownField {
                field: entry.key.clone(),
            })?;
        if !field.key && !field.mutable {
            continue;
        }
        let value = match &entry.value {
            FieldValue::Single(value) => value.clone(),
            FieldValue::Many(_) => {
                return Err(DataError::UnsupportedValue {
                    field: entry.key.clone(),
                    reason: "collection in a keyed update",
                })
            }
        };
        if field.key {
            if !where_clause.is_empty() {
                where_clause.push_str(" AND ");
            }
            let name = format!("p{}", where_params.len());
            where_clause.push_str(&format!("{} = @{name}", field.column));
            where_params.push((name, value));
        } else {
            if !set_clause.is_empty() {
                set_clause.push_str(", ");
            }
            let name = format!("s{}", set_params.len());
            set_clause.push_str(&format!("{} = @{name}", field.column));
            set_params.push((name, value));
        }
    }
    if where_params.is_empty() {
        return Err(DataError::MissingKey {
            table: S::table_name(),
        });
    }
    if set_params.is_empty() {
        return Err(DataError::NoAssignments);
    }
    let sql = format!(
        "UPDATE {} SET {set_clause} WHERE {where_clause}",
        S::table_name()
    );
    let mut params = set_params;
    params.extend(where_params);
    Ok(Statement::new(sql, params))
}

/// `DELETE FROM <table> WHERE <keys>` from the key fields present in the
/// descriptor. Non-key fields are ignored; a descriptor with no key fields
/// fails with `MissingKey`.
pub fn delete_by_key<S: TableSchema>(descriptor: &Descriptor) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let mut clause = String::new();
    let mut params: Vec<(String, Value)> = Vec::new();
    for field in S::key_fields() {
        let Some(entry) = descriptor.entries().iter().find(|e| e.key == field.name) else {
            continue;
        };
        let value = match &entry.value {
            FieldValue::Single(value) => value.clone(),
            FieldValue::Many(_) => {
                return Err(DataError::UnsupportedValue {
                    field: entry.key.clone(),
                    reason: "collection as key value",
                })
            }
        };
        if !clause.is_empty() {
            clause.push_str(" AND ");
        }
        let name = format!("p{}", params.len());
        clause.push_str(&format!("{} = @{name}", field.column));
        params.push((name, value));
    }
    if params.is_empty() {
        return Err(DataError::MissingKey {
            table: S::table_name(),
        });
    }
    let sql = format!("DELETE FROM {} WHERE {clause}", S::table_name());
    Ok(Statement::new(sql, params))
}

/// Delete by predicate: `DELETE FROM <table> [WHERE ...]`.
pub fn delete<S: TableSchema>(predicate: &Predicate) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let mut sql = format!("DELETE FROM {}", S::table_name());
    push_where(&mut sql, predicate);
    Ok(Statement::new(sql, predicate.params().to_vec()))
}

/// `SELECT COALESCE(SUM(col), 0) FROM <table> [WHERE ...]`.
///
/// The summed field resolves through the schema. `COALESCE` keeps the
/// empty-set result at zero instead of SQL null.
pub fn sum<S: TableSchema>(field: &str, predicate: &Predicate) -> Result<Statement, DataError> {
    check_identifier(S::table_name(), false, "table")?;
    let column = S::field(field)
        .map(|f| f.column)
        .ok_or_else(|| DataError::UnknownField {
            field: field.to_string(),
        })?;
    let mut sql = format!(
        "SELECT COALESCE(SUM({column}), 0) FROM {}",
        S::table_name()
    );
    push_where(&mut sql, predicate);
    Ok(Statement::new(sql, predicate.params().to_vec()))
}

fn push_where(sql: &mut String, predicate: &Predicate) {
    if !predicate.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(predicate.clause());
    }
}

fn push_order_by<S: TableSchema>(sql: &mut String, order_by: &[SortSpec]) -> Result<(), DataError> {
    if order_by.is_empty() {
        return Ok(());
    }
    sql.push_str(" ORDER BY ");
    for (i, spec) in order_by.iter().enumerate() {
        let column = S::field(&spec.field)
            .map(|f| f.column)
            .ok_or_else(|| DataError::UnknownField {
                field: spec.field.clone(),
            })?;
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&format!("{column} {}", spec.order.sql()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldValue;
    use crate::schema::FieldDef;

    struct User;

    impl TableSchema for User {
        fn table_name() -> &'static str {
            "users"
        }

        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[
                FieldDef::new("id").key(),
                FieldDef::new("name"),
                FieldDef::new("status"),
                FieldDef::new("balance"),
                FieldDef::new("created_at").readonly(),
            ];
            FIELDS
        }
    }

    fn active() -> Predicate {
        let d = Descriptor::from_pairs([("status", FieldValue::from("active"))]).unwrap();
        Predicate::compile(&d, User::fields()).unwrap()
    }

    #[test]
    fn select_with_predicate_and_order() {
        let stmt = select::<User>(&active(), &[SortSpec::desc("id")], None).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM users WHERE status = @p0 ORDER BY id DESC"
        );
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn select_all_without_predicate() {
        let stmt = select::<User>(&Predicate::empty(), &[], None).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM users");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn select_with_column_projection() {
        let stmt = select::<User>(&Predicate::empty(), &[], Some(&["id", "name"])).unwrap();
        assert_eq!(stmt.sql, "SELECT id, name FROM users");
    }

    #[test]
    fn bad_projection_identifier_is_rejected() {
        let err = select::<User>(&Predicate::empty(), &[], Some(&["id; DROP TABLE x"]))
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidIdentifier { kind: "column", .. }));
    }

    #[test]
    fn order_by_unknown_field_is_rejected() {
        let err = select::<User>(&Predicate::empty(), &[SortSpec::asc("nope")], None).unwrap_err();
        assert!(matches!(err, DataError::UnknownField { field } if field == "nope"));
    }

    #[test]
    fn count_fast_path() {
        let stmt = count::<User>(&active()).unwrap();
        assert_eq!(stmt.sql, "SELECT COUNT(*) FROM users WHERE status = @p0");
    }

    #[test]
    fn count_over_wraps_base_query() {
        let stmt = count_over("SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id", &[]);
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) FROM (SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id) AS counted"
        );
    }

    #[test]
    fn window_emits_limit_and_offset() {
        let req = PageRequest::new(2, 10).order_asc("id");
        let stmt = window::<User>(&active(), &req).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM users WHERE status = @p0 ORDER BY id ASC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn window_rejects_unordered_request() {
        let req = PageRequest::new(0, 10);
        let err = window::<User>(&Predicate::empty(), &req).unwrap_err();
        assert!(matches!(err, DataError::MissingOrderBy));
    }

    #[test]
    fn window_over_custom_sql() {
        let req = PageRequest::new(1, 5).order_desc("total");
        let stmt = window_over("SELECT name, SUM(balance) AS total FROM users GROUP BY name", &[], &req)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM (SELECT name, SUM(balance) AS total FROM users GROUP BY name) AS windowed ORDER BY total DESC LIMIT 5 OFFSET 5"
        );
    }

    #[test]
    fn insert_skips_generated_key() {
        let d = Descriptor::from_pairs([
            ("id", FieldValue::Single(Value::Null)),
            ("name", FieldValue::from("Ada")),
            ("status", FieldValue::from("active")),
        ])
        .unwrap();
        let stmt = insert::<User>(&d, false).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (name, status) VALUES (@v0, @v1)"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn insert_with_natural_key() {
        let d = Descriptor::from_pairs([
            ("id", FieldValue::from(42i64)),
            ("name", FieldValue::from("Ada")),
        ])
        .unwrap();
        let stmt = insert::<User>(&d, true).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO users (id, name) VALUES (@v0, @v1)");
    }

    #[test]
    fn insert_rejects_unknown_field() {
        let d = Descriptor::from_pairs([("nope", FieldValue::from(1i64))]).unwrap();
        let err = insert::<User>(&d, false).unwrap_err();
        assert!(matches!(err, DataError::UnknownField { field } if field == "nope"));
    }

    #[test]
    fn insert_with_only_key_and_no_key_inclusion_fails() {
        let d = Descriptor::from_pairs([("id", FieldValue::from(1i64))]).unwrap();
        let err = insert::<User>(&d, false).unwrap_err();
        assert!(matches!(err, DataError::EmptyDescriptor));
    }

    #[test]
    fn insert_many_builds_one_multi_row_statement() {
        let rows = vec![
            Descriptor::from_pairs([
                ("name", FieldValue::from("Ada")),
                ("status", FieldValue::from("active")),
            ])
            .unwrap(),
            Descriptor::from_pairs([
                ("name", FieldValue::from("Grace")),
                ("status", FieldValue::from("inactive")),
            ])
            .unwrap(),
        ];
        let stmt = insert_many::<User>(&rows, false).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (name, status) VALUES (@v0, @v1), (@v2, @v3)"
        );
        assert_eq!(stmt.params.len(), 4);
        assert_eq!(stmt.params[2], ("v2".to_string(), Value::Text("Grace".into())));
    }

    #[test]
    fn insert_many_rejects_mismatched_row_shapes() {
        let rows = vec![
            Descriptor::from_pairs([
                ("name", FieldValue::from("Ada")),
                ("status", FieldValue::from("active")),
            ])
            .unwrap(),
            Descriptor::from_pairs([("name", FieldValue::from("Grace"))]).unwrap(),
        ];
        let err = insert_many::<User>(&rows, false).unwrap_err();
        assert!(matches!(
            err,
            DataError::UnsupportedValue { reason: "batch rows must share one column list", .. }
        ));
    }

    #[test]
    fn insert_many_of_nothing_fails() {
        let err = insert_many::<User>(&[], false).unwrap_err();
        assert!(matches!(err, DataError::EmptyDescriptor));
    }

    #[test]
    fn update_from_mutation_plan() {
        let d = Descriptor::from_pairs([
            ("set_name", FieldValue::from("X")),
            ("id", FieldValue::from(7i64)),
        ])
        .unwrap();
        let plan = MutationPlan::compile(&d, User::fields()).unwrap();
        let stmt = update::<User>(&plan).unwrap();
        assert_eq!(stmt.sql, "UPDATE users SET name = @s0 WHERE id = @p0");
        assert_eq!(
            stmt.params,
            vec![
                ("s0".to_string(), Value::Text("X".into())),
                ("p0".to_string(), Value::Int(7)),
            ]
        );
    }

    #[test]
    fn whole_model_update_partitions_on_schema_roles() {
        let d = Descriptor::from_pairs([
            ("id", FieldValue::from(7i64)),
            ("name", FieldValue::from("Ada")),
            ("status", FieldValue::from("active")),
            ("created_at", FieldValue::from(0i64)),
        ])
        .unwrap();
        let stmt = update_by_key::<User>(&d).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE users SET name = @s0, status = @s1 WHERE id = @p0"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn keyed_update_without_key_is_rejected() {
        let d = Descriptor::from_pairs([("name", FieldValue::from("Ada"))]).unwrap();
        let err = update_by_key::<User>(&d).unwrap_err();
        assert!(matches!(err, DataError::MissingKey { table: "users" }));
    }

    #[test]
    fn delete_by_key_uses_key_fields_only() {
        let d = Descriptor::from_pairs([
            ("id", FieldValue::from(7i64)),
            ("name", FieldValue::from("Ada")),
        ])
        .unwrap();
        let stmt = delete_by_key::<User>(&d).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM users WHERE id = @p0");
        assert_eq!(stmt.params, vec![("p0".to_string(), Value::Int(7))]);
    }

    #[test]
    fn delete_by_predicate() {
        let stmt = delete::<User>(&active()).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM users WHERE status = @p0");
    }

    #[test]
    fn sum_resolves_column_and_coalesces() {
        let stmt = sum::<User>("balance", &active()).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COALESCE(SUM(balance), 0) FROM users WHERE status = @p0"
        );
    }

    #[test]
    fn sum_of_unknown_field_is_rejected() {
        let err = sum::<User>("nope", &Predicate::empty()).unwrap_err();
        assert!(matches!(err, DataError::UnknownField { field } if field == "nope"));
    }
}
