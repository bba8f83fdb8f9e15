//! Row selection by a single-field comparison.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use heapdb_common::error::{DbError, DbResult};

use super::{field_type_of, Operator};
use crate::tuple::{Row, Schema, Value};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Returns true if `ordering` (field compared to operand) satisfies
    /// the operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

/// Compares field `field` of a row against a constant.
///
/// Integers compare numerically and strings lexicographically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Index of the compared field.
    pub field: usize,
    /// Comparison operator.
    pub op: CmpOp,
    /// Constant right-hand side.
    pub operand: Value,
}

impl Predicate {
    /// Creates `row[field] op operand`.
    pub fn new(field: usize, op: CmpOp, operand: impl Into<Value>) -> Self {
        Self {
            field,
            op,
            operand: operand.into(),
        }
    }

    /// Returns true if `row` satisfies the predicate. A missing field or
    /// a value of another type never matches.
    pub fn matches(&self, row: &Row) -> bool {
        match row.value(self.field) {
            Some(value) if value.field_type() == self.operand.field_type() => {
                self.op.accepts(value.cmp(&self.operand))
            }
            _ => false,
        }
    }

    fn check(&self, schema: &Schema) -> DbResult<()> {
        let field_type = field_type_of(schema, self.field, "filter")?;
        if field_type != self.operand.field_type() {
            return Err(DbError::invalid_argument(format!(
                "filter: cannot compare {field_type} field {} with {} operand",
                self.field,
                self.operand.field_type()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} {} {}", self.field, self.op, self.operand)
    }
}

/// Passes through the child's rows that satisfy a predicate.
pub struct Filter<C> {
    child: C,
    predicate: Predicate,
}

impl<C: Operator> Filter<C> {
    /// Creates a filter over `child`. Fails if the predicate names a
    /// field the child does not produce, or compares it with a constant
    /// of another type.
    pub fn new(child: C, predicate: Predicate) -> DbResult<Self> {
        predicate.check(child.schema())?;
        Ok(Self { child, predicate })
    }

    /// Returns the predicate.
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Returns the child operator.
    pub fn child(&self) -> &C {
        &self.child
    }
}

impl<C: Operator> Iterator for Filter<C> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.child.next()? {
                Ok(row) if !self.predicate.matches(&row) => continue,
                other => return Some(other),
            }
        }
    }
}

impl<C: Operator> Operator for Filter<C> {
    fn schema(&self) -> &Arc<Schema> {
        self.child.schema()
    }

    fn rewind(&mut self) {
        self.child.rewind();
    }
}

impl<C> fmt::Debug for Filter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("predicate", &self.predicate.to_string())
            .finish_non_exhaustive()
    }
}
