//! Table catalog.
//!
//! Maps table ids to their heap files and names. Ids are handed out
//! sequentially starting at 1.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use heapdb_common::error::{DbError, DbResult};
use heapdb_common::types::TableId;
use parking_lot::RwLock;
use tracing::info;

use crate::file::HeapFile;
use crate::tuple::Schema;

#[derive(Debug, Default)]
struct CatalogInner {
    tables: BTreeMap<TableId, Arc<HeapFile>>,
    names: HashMap<String, TableId>,
    next_id: u32,
}

/// Registry of tables.
///
/// # Example
///
/// ```rust,no_run
/// use heapdb_storage::catalog::Catalog;
/// use heapdb_storage::tuple::{FieldType, Schema};
///
/// let catalog = Catalog::new(4096);
/// let schema = Schema::named(&[(FieldType::Int, "id")]).unwrap();
/// let id = catalog.add_table("users", "/tmp/users.dat", schema).unwrap();
/// assert_eq!(catalog.table_id("users").unwrap(), id);
/// ```
#[derive(Debug)]
pub struct Catalog {
    page_size: usize,
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Creates an empty catalog whose tables use `page_size`-byte pages.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            inner: RwLock::new(CatalogInner {
                next_id: 1,
                ..CatalogInner::default()
            }),
        }
    }

    /// Registers a table backed by the file at `path`, creating the file
    /// if it does not exist.
    pub fn add_table(
        &self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        schema: Schema,
    ) -> DbResult<TableId> {
        let name = name.into();
        let mut inner = self.inner.write();
        if inner.names.contains_key(&name) {
            return Err(DbError::TableExists { name });
        }

        let table_id = TableId::new(inner.next_id);
        let file = HeapFile::open(path, table_id, Arc::new(schema), self.page_size)?;
        info!(table = %table_id, name = %name, path = %file.path().display(), "registered table");

        inner.next_id += 1;
        inner.tables.insert(table_id, Arc::new(file));
        inner.names.insert(name, table_id);
        Ok(table_id)
    }

    /// Returns the heap file of a table.
    pub fn table(&self, table_id: TableId) -> DbResult<Arc<HeapFile>> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .cloned()
            .ok_or_else(|| DbError::table_not_found(table_id))
    }

    /// Returns the schema of a table.
    pub fn schema(&self, table_id: TableId) -> DbResult<Arc<Schema>> {
        self.table(table_id).map(|f| Arc::clone(f.schema()))
    }

    /// Looks up a table id by name.
    pub fn table_id(&self, name: &str) -> DbResult<TableId> {
        self.inner
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| DbError::TableNotFound {
                table: name.to_string(),
            })
    }

    /// Looks up a table name by id.
    pub fn table_name(&self, table_id: TableId) -> DbResult<String> {
        self.inner
            .read()
            .names
            .iter()
            .find(|(_, id)| **id == table_id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| DbError::table_not_found(table_id))
    }

    /// Returns every table id in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        self.inner.read().tables.keys().copied().collect()
    }

    /// Returns the number of tables.
    pub fn len(&self) -> usize {
        self.inner.read().tables.len()
    }

    /// Returns true if no table is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the page size shared by every table.
    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
