//! Subcommand implementations.
//!
//! Every command opens the heap file as the only table of a fresh
//! catalog and goes through a buffer pool, so reads observe the same
//! page locking and caching a running engine would.

use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use heapdb_common::config::EngineConfig;
use heapdb_common::types::{PageId, TableId};
use heapdb_storage::buffer::{BufferPool, BufferPoolConfig};
use heapdb_storage::catalog::Catalog;
use heapdb_storage::page::slots_per_page;
use heapdb_storage::tuple::{Row, Schema, Value};
use heapdb_txn::LockMode;
use tracing::{debug, info};

/// A heap file opened behind a buffer pool.
pub struct Session {
    catalog: Arc<Catalog>,
    pool: BufferPool,
    table: TableId,
}

impl Session {
    /// Opens `file` with rows of `schema`, creating it if needed.
    pub fn open(file: &Path, schema: Schema, config: &EngineConfig) -> Result<Self> {
        let catalog = Arc::new(Catalog::new(config.page_size));
        let name = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("table")
            .to_string();
        let table = catalog
            .add_table(name, file, schema)
            .with_context(|| format!("failed to open heap file {}", file.display()))?;
        let pool = BufferPool::new(BufferPoolConfig::from(config), Arc::clone(&catalog))
            .context("failed to create buffer pool")?;
        debug!(?pool, "session opened");
        Ok(Self {
            catalog,
            pool,
            table,
        })
    }

    /// Returns the table schema.
    pub fn schema(&self) -> Result<Arc<Schema>> {
        Ok(self.catalog.schema(self.table)?)
    }

    /// Returns the buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

/// Layout summary of a heap file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Page size in bytes.
    pub page_size: usize,
    /// Encoded row width.
    pub row_size: usize,
    /// Row slots per page.
    pub slots_per_page: usize,
    /// Live rows on each page, in page order.
    pub rows_per_page: Vec<usize>,
}

impl TableInfo {
    /// Returns the number of live rows.
    pub fn total_rows(&self) -> usize {
        self.rows_per_page.iter().sum()
    }
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "page size:      {}", self.page_size)?;
        writeln!(f, "row size:       {}", self.row_size)?;
        writeln!(f, "slots per page: {}", self.slots_per_page)?;
        writeln!(f, "pages:          {}", self.rows_per_page.len())?;
        writeln!(f, "rows:           {}", self.total_rows())?;
        for (page_no, rows) in self.rows_per_page.iter().enumerate() {
            writeln!(f, "  page {page_no:>5}: {rows}/{}", self.slots_per_page)?;
        }
        Ok(())
    }
}

/// Reads every page under one read transaction and summarizes it.
pub fn info(session: &Session) -> Result<TableInfo> {
    let pool = session.pool();
    let schema = session.schema()?;
    let file = session.catalog.table(session.table)?;
    let txn = pool.begin_transaction();

    let mut rows_per_page = Vec::new();
    for page_no in 0..file.num_pages()? {
        let page = pool.get_page(txn, PageId::new(session.table, page_no), LockMode::Shared)?;
        rows_per_page.push(page.rows().count());
    }
    pool.complete_transaction(txn, true)?;

    Ok(TableInfo {
        page_size: pool.page_size(),
        row_size: schema.row_size(),
        slots_per_page: slots_per_page(pool.page_size(), schema.row_size()),
        rows_per_page,
    })
}

/// Writes every row, tab-separated, to `out`. Returns the row count.
pub fn dump(session: &Session, out: &mut impl Write) -> Result<usize> {
    let pool = session.pool();
    let txn = pool.begin_transaction();

    let mut count = 0;
    for row in pool.scan(txn, session.table)? {
        writeln!(out, "{}", row?)?;
        count += 1;
    }
    pool.complete_transaction(txn, true)?;
    Ok(count)
}

/// Inserts one row per non-empty input line in a single transaction.
///
/// Fields are comma-separated. Lines starting with `#` are skipped.
/// Nothing is committed unless every line loads.
pub fn load(session: &Session, input: impl BufRead) -> Result<usize> {
    let pool = session.pool();
    let schema = session.schema()?;
    let txn = pool.begin_transaction();

    let result = (|| -> Result<usize> {
        let mut count = 0;
        for (line_no, line) in input.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut row = parse_row(&schema, line)
                .with_context(|| format!("line {}", line_no + 1))?;
            pool.insert_row(txn, session.table, &mut row)
                .with_context(|| format!("line {}", line_no + 1))?;
            count += 1;
        }
        Ok(count)
    })();

    match result {
        Ok(count) => {
            pool.complete_transaction(txn, true)?;
            info!(txn = %txn, rows = count, "load committed");
            Ok(count)
        }
        Err(err) => {
            pool.complete_transaction(txn, false)?;
            Err(err)
        }
    }
}

/// Parses one comma-separated line into a row of `schema`.
pub fn parse_row(schema: &Arc<Schema>, line: &str) -> Result<Row> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != schema.num_fields() {
        bail!(
            "expected {} fields, found {}",
            schema.num_fields(),
            parts.len()
        );
    }

    let values = parts
        .iter()
        .zip(schema.types())
        .map(|(text, field_type)| Value::parse(field_type, text.trim()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(Arc::clone(schema), values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn session(dir: &Path) -> Session {
        let config = EngineConfig::builder().page_size(512).build().unwrap();
        let schema = Schema::parse("int:id,str:name").unwrap();
        Session::open(&dir.join("people.dat"), schema, &config).unwrap()
    }

    #[test]
    fn test_parse_row() {
        let schema = Arc::new(Schema::parse("int,str").unwrap());
        let row = parse_row(&schema, " 4 , four").unwrap();
        assert_eq!(row.value(0), Some(&Value::Int(4)));
        assert_eq!(row.value(1), Some(&Value::from("four")));

        assert!(parse_row(&schema, "1").is_err());
        assert!(parse_row(&schema, "x,y").is_err());
    }

    #[test]
    fn test_load_dump_info() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());

        let input = "# id,name\n1,ada\n2,grace\n\n3,barbara\n4,frances\n";
        assert_eq!(load(&session, input.as_bytes()).unwrap(), 4);

        let mut out = Vec::new();
        assert_eq!(dump(&session, &mut out).unwrap(), 4);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().next(), Some("1\tada"));

        let info = info(&session).unwrap();
        assert_eq!(info.slots_per_page, 3);
        assert_eq!(info.rows_per_page, vec![3, 1]);
        assert_eq!(info.total_rows(), 4);
    }

    #[test]
    fn test_failed_load_commits_nothing() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());

        let err = load(&session, "1,ada\nnot-a-number,bob\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let mut out = Vec::new();
        assert_eq!(dump(&session, &mut out).unwrap(), 0);
    }
}
