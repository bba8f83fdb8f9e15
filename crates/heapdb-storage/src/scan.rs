//! Sequential scan over one table.

use std::sync::Arc;

use heapdb_common::error::DbResult;
use heapdb_common::types::{TableId, TxnId};

use crate::buffer::BufferPool;
use crate::file::HeapFileIter;
use crate::tuple::{Row, Schema};

/// Reads every row of a table in storage order, with field names
/// qualified by a table alias.
///
/// # Example
///
/// ```rust,no_run
/// # use heapdb_storage::buffer::BufferPool;
/// # use heapdb_storage::scan::SeqScan;
/// # use heapdb_common::types::{TableId, TxnId};
/// # fn run(pool: &BufferPool, txn: TxnId, table: TableId) -> heapdb_common::DbResult<()> {
/// let scan = SeqScan::new(pool, txn, table, "u")?;
/// for row in scan {
///     println!("{}", row?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SeqScan<'a> {
    inner: HeapFileIter<'a>,
    schema: Arc<Schema>,
    table_name: String,
    alias: String,
}

impl<'a> SeqScan<'a> {
    /// Creates a scan of `table_id` under `txn_id`. Rows carry the
    /// table's schema with every named field prefixed by `alias`.
    pub fn new(
        pool: &'a BufferPool,
        txn_id: TxnId,
        table_id: TableId,
        alias: impl Into<String>,
    ) -> DbResult<Self> {
        let alias = alias.into();
        let table_name = pool.catalog().table_name(table_id)?;
        let inner = pool.scan(txn_id, table_id)?;
        let schema = Arc::new(inner.file().schema().with_alias(&alias));
        Ok(Self {
            inner,
            schema,
            table_name,
            alias,
        })
    }

    /// Returns the alias-qualified schema of produced rows.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the scanned table's name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Restarts the scan from the first row.
    pub fn rewind(&mut self) {
        self.inner.rewind();
    }
}

impl Iterator for SeqScan<'_> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.inner.next()?;
        Some(row.and_then(|r| r.with_schema(Arc::clone(&self.schema))))
    }
}

impl std::fmt::Debug for SeqScan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqScan")
            .field("table_name", &self.table_name)
            .field("alias", &self.alias)
            .field("inner", &self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolConfig;
    use crate::catalog::Catalog;
    use crate::tuple::{FieldType, Value};
    use tempfile::tempdir;

    #[test]
    fn test_scan_aliases_schema() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(Catalog::new(4096));
        let schema = Schema::named(&[(FieldType::Int, "id"), (FieldType::Str, "name")]).unwrap();
        let table = catalog
            .add_table("users", dir.path().join("users.dat"), schema)
            .unwrap();
        let pool = BufferPool::new(BufferPoolConfig::new(8), Arc::clone(&catalog)).unwrap();

        let txn = pool.begin_transaction();
        for (id, name) in [(1, "ada"), (2, "grace")] {
            let mut row = Row::new(
                catalog.schema(table).unwrap(),
                vec![Value::Int(id), Value::from(name)],
            )
            .unwrap();
            pool.insert_row(txn, table, &mut row).unwrap();
        }

        let mut scan = SeqScan::new(&pool, txn, table, "u").unwrap();
        assert_eq!(scan.table_name(), "users");
        assert_eq!(scan.alias(), "u");
        assert_eq!(scan.schema().field_name(1), Some("u.name"));

        let rows: Vec<Row> = scan.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value(1), Some(&Value::from("grace")));
        assert_eq!(rows[0].schema().field_name(0), Some("u.id"));
        assert!(rows[0].record_id().is_some());

        scan.rewind();
        assert_eq!(scan.count(), 2);
    }
}
