//! Grouped aggregation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use heapdb_common::error::{DbError, DbResult};
use tracing::trace;

use super::{field_type_of, Operator};
use crate::tuple::{FieldType, Row, Schema, SchemaField, Value};

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Sum of values.
    Sum,
    /// Integer mean, truncated toward zero.
    Avg,
    /// Number of rows.
    Count,
}

impl AggregateOp {
    /// Returns true if the function applies to fields of `field_type`.
    /// Strings only support counting.
    pub fn supports(self, field_type: FieldType) -> bool {
        field_type == FieldType::Int || self == AggregateOp::Count
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Count => "COUNT",
        };
        f.write_str(name)
    }
}

/// Running state of one group.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: i64,
    sum: i64,
    min: i32,
    max: i32,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: i32::MAX,
            max: i32::MIN,
        }
    }

    fn add(&mut self, value: &Value) {
        self.count += 1;
        if let Value::Int(v) = *value {
            self.sum += i64::from(v);
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
    }

    fn finish(&self, op: AggregateOp) -> DbResult<i32> {
        let result = match op {
            AggregateOp::Min => return Ok(self.min),
            AggregateOp::Max => return Ok(self.max),
            AggregateOp::Sum => self.sum,
            AggregateOp::Avg => self.sum / self.count,
            AggregateOp::Count => self.count,
        };
        i32::try_from(result)
            .map_err(|_| DbError::invalid_argument(format!("{op} result {result} overflows INT")))
    }
}

/// Computes one aggregate over its child, optionally grouped by a field.
///
/// Output rows are `(group, value)` when grouped and `(value)` otherwise,
/// with the value always an INT. Groups come out in ascending group
/// order. An empty child produces no rows, grouped or not.
///
/// The child is drained on the first call to `next`.
pub struct Aggregate<C> {
    child: C,
    field: usize,
    group_by: Option<usize>,
    op: AggregateOp,
    schema: Arc<Schema>,
    results: Option<Vec<Row>>,
    pos: usize,
}

impl<C: Operator> Aggregate<C> {
    /// Creates `op(field)` over `child`, grouped by `group_by` if given.
    ///
    /// Fails if either index is out of range for the child's schema, or
    /// if `op` is not defined for the aggregated field's type.
    pub fn new(
        child: C,
        field: usize,
        group_by: Option<usize>,
        op: AggregateOp,
    ) -> DbResult<Self> {
        let input = Arc::clone(child.schema());
        let field_type = field_type_of(&input, field, "aggregate")?;
        if !op.supports(field_type) {
            return Err(DbError::invalid_argument(format!(
                "aggregate: {op} is not defined for {field_type} fields"
            )));
        }

        let value_name = match input.field_name(field) {
            Some(name) => format!("{op}({name})"),
            None => op.to_string(),
        };
        let mut fields = Vec::with_capacity(2);
        if let Some(group) = group_by {
            let group_type = field_type_of(&input, group, "aggregate")?;
            fields.push(SchemaField {
                field_type: group_type,
                name: input.field_name(group).map(str::to_string),
            });
        }
        fields.push(SchemaField::named(FieldType::Int, value_name));

        Ok(Self {
            child,
            field,
            group_by,
            op,
            schema: Arc::new(Schema::new(fields)?),
            results: None,
            pos: 0,
        })
    }

    /// Returns the aggregate function.
    pub fn op(&self) -> AggregateOp {
        self.op
    }

    /// Returns the aggregated field index.
    pub fn field(&self) -> usize {
        self.field
    }

    /// Returns the grouping field index, if any.
    pub fn group_by(&self) -> Option<usize> {
        self.group_by
    }

    fn compute(&mut self) -> DbResult<Vec<Row>> {
        let mut groups: BTreeMap<Option<Value>, Accumulator> = BTreeMap::new();
        for row in self.child.by_ref() {
            let row = row?;
            let key = self.group_by.and_then(|g| row.value(g).cloned());
            let value = row.value(self.field).ok_or_else(|| {
                DbError::invalid_argument(format!("aggregate: row has no field {}", self.field))
            })?;
            groups.entry(key).or_insert_with(Accumulator::new).add(value);
        }
        trace!(op = %self.op, groups = groups.len(), "aggregate computed");

        groups
            .into_iter()
            .map(|(key, acc)| {
                let mut values = Vec::with_capacity(2);
                values.extend(key);
                values.push(Value::Int(acc.finish(self.op)?));
                Row::new(Arc::clone(&self.schema), values)
            })
            .collect()
    }
}

impl<C: Operator> Iterator for Aggregate<C> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.results.is_none() {
            match self.compute() {
                Ok(rows) => self.results = Some(rows),
                Err(err) => {
                    self.results = Some(Vec::new());
                    return Some(Err(err));
                }
            }
        }
        let row = self.results.as_ref()?.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(row))
    }
}

impl<C: Operator> Operator for Aggregate<C> {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Replays the computed groups. The child is not read again.
    fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl<C> fmt::Debug for Aggregate<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("op", &self.op)
            .field("field", &self.field)
            .field("group_by", &self.group_by)
            .field("computed", &self.results.is_some())
            .finish_non_exhaustive()
    }
}
