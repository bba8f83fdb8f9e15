//! Insert and delete operators.
//!
//! Both drain their child on the first call to `next`, apply every row
//! through the buffer pool, and produce one `(INT count)` row holding the
//! number of affected rows. Rewinding replays the count without touching
//! the table again.

use std::fmt;
use std::sync::Arc;

use heapdb_common::error::{DbError, DbResult};
use heapdb_common::types::{TableId, TxnId};
use tracing::debug;

use super::{count_schema, Operator};
use crate::buffer::BufferPool;
use crate::tuple::{Row, Schema, Value};

/// Tracks the single output row of a modifying operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Pending,
    Applied(usize),
    Emitted(usize),
    Failed,
}

impl Progress {
    fn count_row(count: usize, schema: &Arc<Schema>) -> DbResult<Row> {
        let count = i32::try_from(count).map_err(|_| {
            DbError::invalid_argument(format!("{count} affected rows overflow INT"))
        })?;
        Row::new(Arc::clone(schema), vec![Value::Int(count)])
    }

    /// Runs `apply` once, then yields the count row once per rewind.
    fn step(
        &mut self,
        schema: &Arc<Schema>,
        apply: impl FnOnce() -> DbResult<usize>,
    ) -> Option<DbResult<Row>> {
        let count = match *self {
            Progress::Pending => match apply() {
                Ok(count) => count,
                Err(err) => {
                    *self = Progress::Failed;
                    return Some(Err(err));
                }
            },
            Progress::Applied(count) => count,
            Progress::Emitted(_) | Progress::Failed => return None,
        };
        *self = Progress::Emitted(count);
        Some(Progress::count_row(count, schema))
    }

    fn rewind(&mut self) {
        if let Progress::Emitted(count) = *self {
            *self = Progress::Applied(count);
        }
    }
}

/// Inserts every row of its child into a table.
pub struct Insert<'a, C> {
    pool: &'a BufferPool,
    txn_id: TxnId,
    table_id: TableId,
    child: C,
    schema: Arc<Schema>,
    progress: Progress,
}

impl<'a, C: Operator> Insert<'a, C> {
    /// Creates an insert of `child`'s rows into `table_id` under `txn_id`.
    /// Fails if the child's row types differ from the table's.
    pub fn new(pool: &'a BufferPool, txn_id: TxnId, table_id: TableId, child: C) -> DbResult<Self> {
        let table_schema = pool.catalog().schema(table_id)?;
        if **child.schema() != *table_schema {
            return Err(DbError::SchemaMismatch {
                expected: table_schema.to_string(),
                actual: child.schema().to_string(),
            });
        }
        Ok(Self {
            pool,
            txn_id,
            table_id,
            child,
            schema: count_schema()?,
            progress: Progress::Pending,
        })
    }

    fn apply(
        pool: &BufferPool,
        txn_id: TxnId,
        table_id: TableId,
        child: &mut C,
    ) -> DbResult<usize> {
        let table_schema = pool.catalog().schema(table_id)?;
        let mut count = 0;
        for row in child {
            let mut row = row?.with_schema(Arc::clone(&table_schema))?;
            pool.insert_row(txn_id, table_id, &mut row)?;
            count += 1;
        }
        debug!(txn = %txn_id, table = %table_id, rows = count, "insert applied");
        Ok(count)
    }
}

impl<C: Operator> Iterator for Insert<'_, C> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let Self {
            pool,
            txn_id,
            table_id,
            child,
            schema,
            progress,
        } = self;
        progress.step(schema, || Self::apply(pool, *txn_id, *table_id, child))
    }
}

impl<C: Operator> Operator for Insert<'_, C> {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn rewind(&mut self) {
        self.progress.rewind();
    }
}

impl<C> fmt::Debug for Insert<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Insert")
            .field("txn_id", &self.txn_id)
            .field("table_id", &self.table_id)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

/// Deletes every row of its child from the table each row was read from.
///
/// Child rows must carry record ids, as rows from a scan do.
pub struct Delete<'a, C> {
    pool: &'a BufferPool,
    txn_id: TxnId,
    child: C,
    schema: Arc<Schema>,
    progress: Progress,
}

impl<'a, C: Operator> Delete<'a, C> {
    /// Creates a delete of `child`'s rows under `txn_id`.
    pub fn new(pool: &'a BufferPool, txn_id: TxnId, child: C) -> DbResult<Self> {
        Ok(Self {
            pool,
            txn_id,
            child,
            schema: count_schema()?,
            progress: Progress::Pending,
        })
    }

    fn apply(pool: &BufferPool, txn_id: TxnId, child: &mut C) -> DbResult<usize> {
        let mut count = 0;
        for row in child {
            pool.delete_row(txn_id, &row?)?;
            count += 1;
        }
        debug!(txn = %txn_id, rows = count, "delete applied");
        Ok(count)
    }
}

impl<C: Operator> Iterator for Delete<'_, C> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let Self {
            pool,
            txn_id,
            child,
            schema,
            progress,
        } = self;
        progress.step(schema, || Self::apply(pool, *txn_id, child))
    }
}

impl<C: Operator> Operator for Delete<'_, C> {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn rewind(&mut self) {
        self.progress.rewind();
    }
}

impl<C> fmt::Debug for Delete<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delete")
            .field("txn_id", &self.txn_id)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::Fixture;
    use crate::exec::{CmpOp, Filter, Predicate, RowList};
    use crate::scan::SeqScan;
    use crate::tuple::FieldType;
    use tempfile::tempdir;

    fn count_of(row: Option<DbResult<Row>>) -> i32 {
        match row.unwrap().unwrap().value(0) {
            Some(Value::Int(count)) => *count,
            other => panic!("unexpected count {other:?}"),
        }
    }

    #[test]
    fn test_insert_reports_count() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let txn = fx.pool.begin_transaction();

        let rows = vec![fx.row(1, "ada", 5), fx.row(2, "bob", 7)];
        let list = RowList::new(fx.schema(), rows).unwrap();
        let mut insert = Insert::new(&fx.pool, txn, fx.table, list).unwrap();
        assert_eq!(insert.schema().field_name(0), Some("count"));

        assert_eq!(count_of(insert.next()), 2);
        assert!(insert.next().is_none());

        // Rewinding repeats the count without inserting again.
        insert.rewind();
        assert_eq!(count_of(insert.next()), 2);
        assert_eq!(fx.pool.scan(txn, fx.table).unwrap().count(), 2);

        fx.pool.complete_transaction(txn, true).unwrap();
    }

    #[test]
    fn test_insert_rejects_other_schema() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let txn = fx.pool.begin_transaction();

        let other = Arc::new(Schema::from_types(&[FieldType::Int]).unwrap());
        let list = RowList::new(other, Vec::new()).unwrap();
        let err = Insert::new(&fx.pool, txn, fx.table, list).unwrap_err();
        assert!(matches!(err, DbError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_insert_copies_between_tables() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let copy = fx
            .catalog
            .add_table("copy", dir.path().join("copy.dat"), Schema::clone(&fx.schema()))
            .unwrap();
        let txn = fx.pool.begin_transaction();
        fx.seed(txn, &[(1, "ada", 5), (2, "bob", 7), (3, "cy", 9)]);

        // Aliased scan rows carry the same field types as the target.
        let scan = SeqScan::new(&fx.pool, txn, fx.table, "src").unwrap();
        let filter = Filter::new(scan, Predicate::new(2, CmpOp::Gt, 5)).unwrap();
        let mut insert = Insert::new(&fx.pool, txn, copy, filter).unwrap();
        assert_eq!(count_of(insert.next()), 2);

        let copied: Vec<Row> = fx.pool.scan(txn, copy).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(copied.len(), 2);
        assert_eq!(copied[0].value(1), Some(&Value::from("bob")));
        assert_eq!(copied[0].schema().field_name(1), Some("name"));
        fx.pool.complete_transaction(txn, true).unwrap();
    }

    #[test]
    fn test_delete_filtered_rows() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let txn = fx.pool.begin_transaction();
        fx.seed(txn, &[(1, "ada", 5), (2, "bob", 7), (3, "cy", 9), (4, "di", 1)]);
        fx.pool.complete_transaction(txn, true).unwrap();

        let txn = fx.pool.begin_transaction();
        let scan = SeqScan::new(&fx.pool, txn, fx.table, "p").unwrap();
        let filter = Filter::new(scan, Predicate::new(2, CmpOp::Le, 5)).unwrap();
        let mut delete = Delete::new(&fx.pool, txn, filter).unwrap();
        assert_eq!(count_of(delete.next()), 2);
        assert!(delete.next().is_none());
        fx.pool.complete_transaction(txn, true).unwrap();

        let txn = fx.pool.begin_transaction();
        let left: Vec<Value> = fx
            .pool
            .scan(txn, fx.table)
            .unwrap()
            .map(|r| r.unwrap().value(0).cloned().unwrap())
            .collect();
        assert_eq!(left, vec![Value::Int(2), Value::Int(3)]);
        fx.pool.complete_transaction(txn, true).unwrap();
    }

    #[test]
    fn test_delete_aborted_keeps_rows() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let txn = fx.pool.begin_transaction();
        fx.seed(txn, &[(1, "ada", 5), (2, "bob", 7)]);
        fx.pool.complete_transaction(txn, true).unwrap();

        let txn = fx.pool.begin_transaction();
        let scan = SeqScan::new(&fx.pool, txn, fx.table, "p").unwrap();
        let mut delete = Delete::new(&fx.pool, txn, scan).unwrap();
        assert_eq!(count_of(delete.next()), 2);
        fx.pool.complete_transaction(txn, false).unwrap();

        let txn = fx.pool.begin_transaction();
        assert_eq!(fx.pool.scan(txn, fx.table).unwrap().count(), 2);
        fx.pool.complete_transaction(txn, true).unwrap();
    }

    #[test]
    fn test_delete_needs_record_ids() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let txn = fx.pool.begin_transaction();

        let list = RowList::new(fx.schema(), vec![fx.row(1, "ada", 5)]).unwrap();
        let mut delete = Delete::new(&fx.pool, txn, list).unwrap();
        assert!(matches!(
            delete.next(),
            Some(Err(DbError::MissingRecordId))
        ));
        // A failed operator is exhausted.
        assert!(delete.next().is_none());
        fx.pool.complete_transaction(txn, false).unwrap();
    }
}
