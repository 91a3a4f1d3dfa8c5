use serde::Serialize;

use crate::error::DataError;
use crate::value::Value;

/// Marker prefix on a descriptor key that turns the entry into a `SET`
/// assignment target for the mutation compiler.
///
/// `{"set_name": "X", "id": 7}` assigns `name` and filters on `id`. A column
/// whose real name starts with `set_` is addressed by doubling the prefix.
pub const ASSIGN_MARKER: &str = "set_";

/// Explicit direction of a tagged parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
            Direction::InputOutput => "input-output",
            Direction::ReturnValue => "return-value",
        }
    }
}

/// The value side of a descriptor entry.
///
/// Collection values are marked for expansion into a SQL `IN (...)` list
/// with one placeholder per element, instead of an equality comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Single(Value),
    Many(Vec<Value>),
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Single(v)
    }
}

impl From<Vec<Value>> for FieldValue {
    fn from(v: Vec<Value>) -> Self {
        FieldValue::Many(v)
    }
}

macro_rules! impl_field_value_from {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::Single(v.into())
                }
            }
            impl From<Vec<$ty>> for FieldValue {
                fn from(v: Vec<$ty>) -> Self {
                    FieldValue::Many(v.into_iter().map(Value::from).collect())
                }
            }
        )+
    };
}

impl_field_value_from!(bool, i32, i64, f64, &str, String);

/// One resolved descriptor entry: the raw key as supplied by the caller and
/// its value. Marker/operator parsing happens at compile time, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: FieldValue,
}

/// An ordered field/value list used to build SQL.
///
/// Insertion order is preserved and determines clause ordering in compiled
/// SQL. Keys are unique; a duplicate is rejected when the descriptor is
/// built, not silently overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Descriptor {
    entries: Vec<Entry>,
}

impl Descriptor {
    /// Resolve an ordered list of `(key, value)` pairs.
    ///
    /// This is the map-shaped input: any iterator of pairs works, including
    /// `Vec<(_, _)>` and ordered maps.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let mut descriptor = Descriptor::default();
        for (key, value) in pairs {
            descriptor.push(key.into(), value.into())?;
        }
        descriptor.ensure_non_empty()
    }

    /// Resolve a structured model field-by-field.
    ///
    /// The model is flattened through serde, so field order follows the
    /// struct declaration. Collection-valued fields are marked for `IN`
    /// expansion; `None` becomes a null entry.
    pub fn from_model<T: Serialize>(model: &T) -> Result<Self, DataError> {
        let json = serde_json::to_value(model).map_err(|_| DataError::UnsupportedValue {
            field: std::any::type_name::<T>().to_string(),
            reason: "model failed to serialize",
        })?;
        let serde_json::Value::Object(map) = json else {
            return Err(DataError::EmptyDescriptor);
        };
        let mut descriptor = Descriptor::default();
        for (key, value) in &map {
            let field_value = match value {
                serde_json::Value::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        let value = Value::from_json_scalar(item).ok_or_else(|| {
                            DataError::UnsupportedValue {
                                field: key.clone(),
                                reason: "nested collection element",
                            }
                        })?;
                        values.push(value);
                    }
                    FieldValue::Many(values)
                }
                scalar => FieldValue::Single(Value::from_json_scalar(scalar).ok_or_else(
                    || DataError::UnsupportedValue {
                        field: key.clone(),
                        reason: "nested object",
                    },
                )?),
            };
            descriptor.push(key.clone(), field_value)?;
        }
        descriptor.ensure_non_empty()
    }

    /// Resolve a tagged parameter object.
    ///
    /// Only input parameters can be bound to SQL text; any other direction
    /// fails with `UnsupportedDirection`.
    pub fn from_params(params: &DbParams) -> Result<Self, DataError> {
        let mut descriptor = Descriptor::default();
        for param in &params.params {
            if param.direction != Direction::Input {
                return Err(DataError::UnsupportedDirection {
                    name: param.name.clone(),
                    direction: param.direction.as_str(),
                });
            }
            descriptor.push(param.name.clone(), param.value.clone())?;
        }
        descriptor.ensure_non_empty()
    }

    fn push(&mut self, key: String, value: FieldValue) -> Result<(), DataError> {
        if self.entries.iter().any(|e| e.key == key) {
            return Err(DataError::DuplicateField { field: key });
        }
        self.entries.push(Entry { key, value });
        Ok(())
    }

    fn ensure_non_empty(self) -> Result<Self, DataError> {
        if self.entries.is_empty() {
            return Err(DataError::EmptyDescriptor);
        }
        Ok(self)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A tagged parameter object carrying explicit directions, for callers that
/// need more than a plain map.
#[derive(Debug, Clone, Default)]
pub struct DbParams {
    params: Vec<DbParam>,
}

#[derive(Debug, Clone)]
pub struct DbParam {
    pub name: String,
    pub value: FieldValue,
    pub direction: Direction,
}

impl DbParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.params.push(DbParam {
            name: name.into(),
            value: value.into(),
            direction: Direction::Input,
        });
        self
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.params.push(DbParam {
            name: name.into(),
            value: FieldValue::Single(Value::Null),
            direction: Direction::Output,
        });
        self
    }

    pub fn input_output(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.params.push(DbParam {
            name: name.into(),
            value: value.into(),
            direction: Direction::InputOutput,
        });
        self
    }

    pub fn return_value(mut self, name: impl Into<String>) -> Self {
        self.params.push(DbParam {
            name: name.into(),
            value: FieldValue::Single(Value::Null),
            direction: Direction::ReturnValue,
        });
        self
    }
}
