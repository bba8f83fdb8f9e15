//! Rows and record ids.

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use heapdb_common::error::{DbError, DbResult};
use heapdb_common::types::PageId;

use super::schema::Schema;
use super::value::Value;

/// Location of a stored row: its page and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    /// Page holding the row.
    pub page_id: PageId,
    /// Slot within the page.
    pub slot: u16,
}

impl RecordId {
    /// Creates a new record id.
    pub const fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot)
    }
}

/// A row of values conforming to a schema.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use heapdb_storage::tuple::{FieldType, Row, Schema, Value};
///
/// let schema = Arc::new(Schema::from_types(&[FieldType::Int, FieldType::Str]).unwrap());
/// let row = Row::new(schema, vec![Value::Int(1), Value::from("one")]).unwrap();
/// assert_eq!(row.to_string(), "1\tone");
/// assert!(row.record_id().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Row {
    /// Creates a row, checking the values against the schema.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> DbResult<Self> {
        let matches = values.len() == schema.num_fields()
            && values
                .iter()
                .zip(schema.types())
                .all(|(v, t)| v.field_type() == t);
        if !matches {
            return Err(DbError::SchemaMismatch {
                expected: schema.to_string(),
                actual: values
                    .iter()
                    .map(|v| v.field_type().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        Ok(Self {
            schema,
            values,
            record_id: None,
        })
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns all values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns value `i`.
    pub fn value(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }

    /// Returns where the row is stored, if it has been stored.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    /// Sets or clears the stored location.
    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Re-tags the row with an equal schema, such as an aliased copy.
    pub fn with_schema(mut self, schema: Arc<Schema>) -> DbResult<Self> {
        if *schema != *self.schema {
            return Err(DbError::SchemaMismatch {
                expected: schema.to_string(),
                actual: self.schema.to_string(),
            });
        }
        self.schema = schema;
        Ok(self)
    }

    /// Writes the fixed-width encoding, `schema.row_size()` bytes.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        for value in &self.values {
            value.encode(buf);
        }
    }

    /// Reads one row. Returns `None` if any field is not a valid encoding.
    ///
    /// The caller must ensure `buf` holds at least `schema.row_size()`
    /// bytes.
    pub fn decode<B: Buf>(schema: &Arc<Schema>, buf: &mut B) -> Option<Self> {
        let values = schema
            .types()
            .map(|t| Value::decode(t, &mut *buf))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            schema: Arc::clone(schema),
            values,
            record_id: None,
        })
    }
}

/// Rows compare by values only; schema and location are ignored.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for Row {}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::FieldType;
    use bytes::BytesMut;
    use heapdb_common::types::TableId;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::named(&[(FieldType::Int, "id"), (FieldType::Str, "name")]).unwrap())
    }

    #[test]
    fn test_new_checks_types() {
        assert!(Row::new(schema(), vec![Value::Int(1), Value::from("x")]).is_ok());

        let err = Row::new(schema(), vec![Value::from("x"), Value::Int(1)]).unwrap_err();
        assert!(matches!(err, DbError::SchemaMismatch { .. }));
        assert!(Row::new(schema(), vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn test_encode_decode() {
        let s = schema();
        let row = Row::new(Arc::clone(&s), vec![Value::Int(-7), Value::from("seven")]).unwrap();

        let mut buf = BytesMut::new();
        row.encode(&mut buf);
        assert_eq!(buf.len(), s.row_size());

        let decoded = Row::decode(&s, &mut buf.freeze()).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_with_schema() {
        let s = schema();
        let mut row = Row::new(Arc::clone(&s), vec![Value::Int(1), Value::from("a")]).unwrap();
        let rid = RecordId::new(PageId::new(TableId::new(1), 0), 3);
        row.set_record_id(Some(rid));

        let aliased = Arc::new(s.with_alias("t"));
        let row = row.with_schema(Arc::clone(&aliased)).unwrap();
        assert_eq!(row.schema().field_name(0), Some("t.id"));
        assert_eq!(row.record_id(), Some(rid));

        let other = Arc::new(Schema::from_types(&[FieldType::Int]).unwrap());
        assert!(row.with_schema(other).is_err());
    }

    #[test]
    fn test_display() {
        let row = Row::new(schema(), vec![Value::Int(3), Value::from("c")]).unwrap();
        assert_eq!(row.to_string(), "3\tc");
        let rid = RecordId::new(PageId::new(TableId::new(2), 5), 9);
        assert_eq!(rid.to_string(), "2:5#9");
    }
}
