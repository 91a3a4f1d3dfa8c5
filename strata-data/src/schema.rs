/// Static metadata for one persisted field of a row type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as it appears in descriptors and models.
    pub name: &'static str,
    /// Column name in the database.
    pub column: &'static str,
    /// Whether the field may appear as a `SET` target.
    pub mutable: bool,
    /// Whether the field is part of the primary key.
    pub key: bool,
}

impl FieldDef {
    /// A mutable, non-key field whose column name equals its field name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            mutable: true,
            key: false,
        }
    }

    /// Override the stored column name.
    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    /// Mark the field as a primary-key component. Key fields are immutable.
    pub const fn key(mut self) -> Self {
        self.key = true;
        self.mutable = false;
        self
    }

    /// Mark the field as read-only (never a `SET` target).
    pub const fn readonly(mut self) -> Self {
        self.mutable = false;
        self
    }
}

/// Statically declared schema for a row type.
///
/// This replaces runtime reflection over arbitrary objects: each persisted
/// type registers its table name and ordered field list once, and the
/// resolver/compilers consult that declaration.
///
/// # Example
///
/// ```ignore
/// impl TableSchema for User {
///     fn table_name() -> &'static str { "users" }
///     fn fields() -> &'static [FieldDef] {
///         const FIELDS: &[FieldDef] = &[
///             FieldDef::new("id").key(),
///             FieldDef::new("name"),
///             FieldDef::new("status"),
///         ];
///         FIELDS
///     }
/// }
/// ```
pub trait TableSchema {
    fn table_name() -> &'static str;
    fn fields() -> &'static [FieldDef];

    /// Look up a field by its descriptor name.
    fn field(name: &str) -> Option<&'static FieldDef> {
        Self::fields().iter().find(|f| f.name == name)
    }

    /// The primary-key components, in declaration order.
    fn key_fields() -> impl Iterator<Item = &'static FieldDef> {
        Self::fields().iter().filter(|f| f.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Person;

    impl TableSchema for Person {
        fn table_name() -> &'static str {
            "people"
        }

        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[
                FieldDef::new("id").key(),
                FieldDef::new("name"),
                FieldDef::new("created_at").column("createdAt").readonly(),
            ];
            FIELDS
        }
    }

    #[test]
    fn key_fields_are_immutable() {
        let id = Person::field("id").unwrap();
        assert!(id.key);
        assert!(!id.mutable);
    }

    #[test]
    fn column_override() {
        assert_eq!(Person::field("created_at").unwrap().column, "createdAt");
    }

    #[test]
    fn key_fields_iterator() {
        let keys: Vec<_> = Person::key_fields().map(|f| f.name).collect();
        assert_eq!(keys, vec!["id"]);
    }
}
