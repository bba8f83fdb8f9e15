//! Pull-based query operators.
//!
//! Every operator is an [`Iterator`] of `DbResult<Row>` that also knows
//! the schema of the rows it produces and can restart. Operators own
//! their child, so a plan is a nested value:
//!
//! ```rust,no_run
//! # use heapdb_storage::buffer::BufferPool;
//! # use heapdb_storage::exec::{Aggregate, AggregateOp, CmpOp, Filter, Predicate};
//! # use heapdb_storage::scan::SeqScan;
//! # use heapdb_storage::tuple::Value;
//! # use heapdb_common::types::{TableId, TxnId};
//! # fn run(pool: &BufferPool, txn: TxnId, table: TableId) -> heapdb_common::DbResult<()> {
//! // SELECT COUNT(id) FROM users u WHERE u.id > 10
//! let scan = SeqScan::new(pool, txn, table, "u")?;
//! let filter = Filter::new(scan, Predicate::new(0, CmpOp::Gt, Value::Int(10)))?;
//! let count = Aggregate::new(filter, 0, None, AggregateOp::Count)?;
//! for row in count {
//!     println!("{}", row?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Errors from a child are passed through unchanged. Abort errors
//! (deadlock or lock timeout) have already rolled the transaction back
//! by the time an operator sees them.

mod aggregate;
mod filter;
mod modify;

pub use aggregate::{Aggregate, AggregateOp};
pub use filter::{CmpOp, Filter, Predicate};
pub use modify::{Delete, Insert};

use std::sync::Arc;

use heapdb_common::error::{DbError, DbResult};

use crate::scan::SeqScan;
use crate::tuple::{FieldType, Row, Schema};

/// A restartable source of rows.
pub trait Operator: Iterator<Item = DbResult<Row>> {
    /// Returns the schema of produced rows.
    fn schema(&self) -> &Arc<Schema>;

    /// Restarts the operator from its first row.
    fn rewind(&mut self);
}

impl Operator for SeqScan<'_> {
    fn schema(&self) -> &Arc<Schema> {
        SeqScan::schema(self)
    }

    fn rewind(&mut self) {
        SeqScan::rewind(self);
    }
}

/// An in-memory list of rows, replayed in order.
#[derive(Debug, Clone)]
pub struct RowList {
    schema: Arc<Schema>,
    rows: Vec<Row>,
    pos: usize,
}

impl RowList {
    /// Creates a list, checking every row against `schema`.
    pub fn new(schema: Arc<Schema>, rows: Vec<Row>) -> DbResult<Self> {
        let rows = rows
            .into_iter()
            .map(|row| row.with_schema(Arc::clone(&schema)))
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self {
            schema,
            rows,
            pos: 0,
        })
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the list holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Iterator for RowList {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(row))
    }
}

impl Operator for RowList {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }
}

/// Returns the type of field `index`, or an error naming the operator.
fn field_type_of(schema: &Schema, index: usize, operator: &str) -> DbResult<FieldType> {
    schema.field_type(index).ok_or_else(|| {
        DbError::invalid_argument(format!(
            "{operator}: field {index} is out of range for ({schema})"
        ))
    })
}

/// Schema of the single count row produced by modifying operators.
fn count_schema() -> DbResult<Arc<Schema>> {
    Ok(Arc::new(Schema::named(&[(FieldType::Int, "count")])?))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use heapdb_common::types::{TableId, TxnId};

    use crate::buffer::{BufferPool, BufferPoolConfig};
    use crate::catalog::Catalog;
    use crate::tuple::{FieldType, Row, Schema, Value};

    /// A pool over one `(INT id, STRING name, INT score)` table.
    pub struct Fixture {
        pub catalog: Arc<Catalog>,
        pub pool: BufferPool,
        pub table: TableId,
    }

    impl Fixture {
        pub fn new(dir: &Path) -> Self {
            let catalog = Arc::new(Catalog::new(4096));
            let schema = Schema::named(&[
                (FieldType::Int, "id"),
                (FieldType::Str, "name"),
                (FieldType::Int, "score"),
            ])
            .unwrap();
            let table = catalog
                .add_table("players", dir.join("players.dat"), schema)
                .unwrap();
            let pool = BufferPool::new(BufferPoolConfig::new(16), Arc::clone(&catalog)).unwrap();
            Self {
                catalog,
                pool,
                table,
            }
        }

        pub fn schema(&self) -> Arc<Schema> {
            self.catalog.schema(self.table).unwrap()
        }

        pub fn row(&self, id: i32, name: &str, score: i32) -> Row {
            Row::new(
                self.schema(),
                vec![Value::Int(id), Value::from(name), Value::Int(score)],
            )
            .unwrap()
        }

        /// Inserts rows directly through the pool.
        pub fn seed(&self, txn: TxnId, rows: &[(i32, &str, i32)]) {
            for &(id, name, score) in rows {
                let mut row = self.row(id, name, score);
                self.pool.insert_row(txn, self.table, &mut row).unwrap();
            }
        }
    }
}
