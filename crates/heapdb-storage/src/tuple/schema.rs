//! Row descriptors.

use std::fmt;
use std::str::FromStr;

use heapdb_common::constants::{INT_FIELD_LEN, STRING_FIELD_LEN, STRING_LEN_PREFIX};
use heapdb_common::error::{DbError, DbResult};

/// Type of one fixed-width field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 4-byte big-endian signed integer.
    Int,
    /// Length-prefixed string with a fixed 128-byte payload.
    Str,
}

impl FieldType {
    /// Returns the encoded width in bytes.
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            FieldType::Int => INT_FIELD_LEN,
            FieldType::Str => STRING_LEN_PREFIX + STRING_FIELD_LEN,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Str => write!(f, "STRING"),
        }
    }
}

impl FromStr for FieldType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(FieldType::Int),
            "str" | "string" | "text" => Ok(FieldType::Str),
            other => Err(DbError::invalid_argument(format!(
                "unknown field type '{other}'"
            ))),
        }
    }
}

/// One field of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaField {
    /// Field type.
    pub field_type: FieldType,
    /// Optional field name.
    pub name: Option<String>,
}

impl SchemaField {
    /// Creates a named field.
    pub fn named(field_type: FieldType, name: impl Into<String>) -> Self {
        Self {
            field_type,
            name: Some(name.into()),
        }
    }

    /// Creates an anonymous field.
    pub fn anonymous(field_type: FieldType) -> Self {
        Self {
            field_type,
            name: None,
        }
    }
}

/// Ordered list of typed, optionally named fields describing a row.
///
/// Two schemas are equal when their field types match position by
/// position; names are ignored.
///
/// # Example
///
/// ```rust
/// use heapdb_storage::tuple::{FieldType, Schema};
///
/// let schema = Schema::named(&[(FieldType::Int, "id"), (FieldType::Str, "name")]).unwrap();
/// assert_eq!(schema.row_size(), 4 + 132);
/// assert_eq!(schema.index_of("name").unwrap(), 1);
/// assert_eq!(schema, Schema::from_types(&[FieldType::Int, FieldType::Str]).unwrap());
/// ```
#[derive(Debug, Clone, Eq)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    /// Creates a schema from fields.
    ///
    /// Fails if `fields` is empty.
    pub fn new(fields: Vec<SchemaField>) -> DbResult<Self> {
        if fields.is_empty() {
            return Err(DbError::invalid_argument("schema has no fields"));
        }
        Ok(Self { fields })
    }

    /// Creates a schema of anonymous fields.
    pub fn from_types(types: &[FieldType]) -> DbResult<Self> {
        Self::new(types.iter().map(|&t| SchemaField::anonymous(t)).collect())
    }

    /// Creates a schema of named fields.
    pub fn named(fields: &[(FieldType, &str)]) -> DbResult<Self> {
        Self::new(
            fields
                .iter()
                .map(|&(t, name)| SchemaField::named(t, name))
                .collect(),
        )
    }

    /// Parses a comma-separated list such as `int:id,str:name` or `int,str`.
    pub fn parse(spec: &str) -> DbResult<Self> {
        let mut fields = Vec::new();
        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let field = match item.split_once(':') {
                Some((ty, name)) => SchemaField::named(ty.parse()?, name.trim()),
                None => SchemaField::anonymous(item.parse()?),
            };
            fields.push(field);
        }
        Self::new(fields)
    }

    /// Concatenates two schemas.
    pub fn merge(a: &Schema, b: &Schema) -> Self {
        let mut fields = a.fields.clone();
        fields.extend(b.fields.iter().cloned());
        Self { fields }
    }

    /// Returns a copy with every named field prefixed as `alias.name`.
    pub fn with_alias(&self, alias: &str) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|f| SchemaField {
                field_type: f.field_type,
                name: f.name.as_ref().map(|n| format!("{alias}.{n}")),
            })
            .collect();
        Self { fields }
    }

    /// Returns the number of fields.
    #[inline]
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Returns the type of field `i`.
    pub fn field_type(&self, i: usize) -> Option<FieldType> {
        self.fields.get(i).map(|f| f.field_type)
    }

    /// Returns the name of field `i`.
    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.fields.get(i).and_then(|f| f.name.as_deref())
    }

    /// Returns the index of the first field called `name`.
    pub fn index_of(&self, name: &str) -> DbResult<usize> {
        self.fields
            .iter()
            .position(|f| f.name.as_deref() == Some(name))
            .ok_or_else(|| DbError::FieldNotFound {
                name: name.to_string(),
            })
    }

    /// Returns the encoded row width in bytes.
    pub fn row_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.width()).sum()
    }

    /// Iterates over the fields.
    pub fn fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter()
    }

    /// Iterates over the field types.
    pub fn types(&self) -> impl Iterator<Item = FieldType> + '_ {
        self.fields.iter().map(|f| f.field_type)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.types().eq(other.types())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &field.name {
                Some(name) => write!(f, "{}({})", field.field_type, name)?,
                None => write!(f, "{}", field.field_type)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_size() {
        let schema = Schema::from_types(&[FieldType::Int, FieldType::Int]).unwrap();
        assert_eq!(schema.row_size(), 8);

        let schema = Schema::from_types(&[FieldType::Str, FieldType::Str]).unwrap();
        assert_eq!(schema.row_size(), 264);
    }

    #[test]
    fn test_equality_ignores_names() {
        let a = Schema::named(&[(FieldType::Int, "a")]).unwrap();
        let b = Schema::named(&[(FieldType::Int, "b")]).unwrap();
        let c = Schema::from_types(&[FieldType::Str]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_index_of() {
        let schema = Schema::named(&[(FieldType::Int, "id"), (FieldType::Str, "name")]).unwrap();
        assert_eq!(schema.index_of("id").unwrap(), 0);
        let err = schema.index_of("missing").unwrap_err();
        assert!(matches!(err, DbError::FieldNotFound { .. }));
    }

    #[test]
    fn test_merge_and_alias() {
        let a = Schema::named(&[(FieldType::Int, "id")]).unwrap();
        let b = Schema::from_types(&[FieldType::Str]).unwrap();
        let merged = Schema::merge(&a, &b);
        assert_eq!(merged.num_fields(), 2);
        assert_eq!(merged.field_type(1), Some(FieldType::Str));

        let aliased = merged.with_alias("t");
        assert_eq!(aliased.field_name(0), Some("t.id"));
        assert_eq!(aliased.field_name(1), None);
        assert_eq!(aliased, merged);
    }

    #[test]
    fn test_parse() {
        let schema = Schema::parse("int:id, str:name").unwrap();
        assert_eq!(schema.to_string(), "INT(id), STRING(name)");

        let schema = Schema::parse("int,int").unwrap();
        assert_eq!(schema.row_size(), 8);

        assert!(Schema::parse("").is_err());
        assert!(Schema::parse("float").is_err());
    }

    #[test]
    fn test_empty_schema_rejected() {
        let err = Schema::new(Vec::new()).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));
        assert!(Schema::from_types(&[]).is_err());
        assert!(Schema::named(&[]).is_err());

        let schema = Schema::new(vec![SchemaField::named(FieldType::Int, "id")]).unwrap();
        assert_eq!(schema.num_fields(), 1);
    }
}
