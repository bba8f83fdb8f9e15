//! Heap page format.
//!
//! A heap page holds fixed-width rows of one schema, preceded by a slot
//! occupancy bitmap.
//!
//! # Page Layout
//!
//! ```text
//! +----------------------+
//! |    Header bitmap     |  ceil(slots / 8) bytes, bit i%8 of byte i/8,
//! |                      |  least significant bit first
//! +----------------------+
//! |    [slot 0]          |  row_size bytes each
//! |    [slot 1]          |
//! |      ...             |
//! |    [slot n-1]        |
//! +----------------------+
//! |    zero padding      |
//! +----------------------+
//! ```
//!
//! Each row costs `row_size` bytes plus one header bit, so a page of
//! `page_size` bytes holds `floor(page_size * 8 / (row_size * 8 + 1))`
//! slots.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use heapdb_common::error::{DbError, DbResult};
use heapdb_common::types::{PageId, TxnId};

use crate::tuple::{RecordId, Row, Schema};

/// Returns the number of slots on a page.
#[inline]
pub const fn slots_per_page(page_size: usize, row_size: usize) -> usize {
    (page_size * 8) / (row_size * 8 + 1)
}

/// Returns the slot count for rows of `row_size` bytes on `page_size`
/// byte pages, rejecting layouts whose slots cannot all be addressed.
///
/// A row wider than the page leaves no slot at all. Slot ids are 16 bits,
/// so a layout with more than `u16::MAX + 1` slots is refused too.
pub fn checked_slots(page_size: usize, row_size: usize) -> DbResult<usize> {
    let slots = slots_per_page(page_size, row_size);
    if slots == 0 {
        return Err(DbError::invalid_argument(format!(
            "rows of {row_size} bytes do not fit on a {page_size}-byte page"
        )));
    }
    if slots - 1 > usize::from(u16::MAX) {
        return Err(DbError::invalid_argument(format!(
            "{slots} slots per page exceed the 16-bit slot id range"
        )));
    }
    Ok(slots)
}

/// Returns the header length in bytes for `slots` slots.
#[inline]
pub const fn header_len(slots: usize) -> usize {
    slots.div_ceil(8)
}

/// A decoded heap page.
///
/// Pages are plain values. The buffer pool shares clean snapshots as
/// `Arc<HeapPage>` and mutation happens on an owned clone that is
/// published back through the pool.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    slots: Vec<Option<Row>>,
    dirtied_by: Option<TxnId>,
}

impl HeapPage {
    /// Creates a page with every slot free.
    pub fn empty(page_id: PageId, schema: Arc<Schema>, page_size: usize) -> Self {
        let num_slots = slots_per_page(page_size, schema.row_size());
        Self {
            page_id,
            schema,
            page_size,
            slots: vec![None; num_slots],
            dirtied_by: None,
        }
    }

    /// Decodes a page from exactly one page of bytes.
    pub fn decode(page_id: PageId, schema: Arc<Schema>, data: &[u8]) -> DbResult<Self> {
        let page_size = data.len();
        let row_size = schema.row_size();
        let num_slots = slots_per_page(page_size, row_size);
        let header = &data[..header_len(num_slots)];

        let mut slots = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                slots.push(None);
                continue;
            }
            let start = header.len() + slot * row_size;
            let mut bytes = &data[start..start + row_size];
            let mut row = Row::decode(&schema, &mut bytes).ok_or_else(|| {
                DbError::corrupted(page_id, format!("undecodable row in slot {slot}"))
            })?;
            let slot_no = u16::try_from(slot).map_err(|_| {
                DbError::corrupted(page_id, format!("slot {slot} is beyond the slot id range"))
            })?;
            row.set_record_id(Some(RecordId::new(page_id, slot_no)));
            slots.push(Some(row));
        }

        Ok(Self {
            page_id,
            schema,
            page_size,
            slots,
            dirtied_by: None,
        })
    }

    /// Encodes the page into exactly `page_size` bytes.
    pub fn encode(&self) -> Bytes {
        let num_slots = self.slots.len();
        let row_size = self.schema.row_size();
        let mut buf = BytesMut::with_capacity(self.page_size);

        let mut header = vec![0u8; header_len(num_slots)];
        for (slot, row) in self.slots.iter().enumerate() {
            if row.is_some() {
                header[slot / 8] |= 1 << (slot % 8);
            }
        }
        buf.put_slice(&header);

        for row in &self.slots {
            match row {
                Some(row) => row.encode(&mut buf),
                None => buf.put_bytes(0, row_size),
            }
        }

        let used = buf.len();
        buf.put_bytes(0, self.page_size - used);
        buf.freeze()
    }

    /// Stores `row` in the first free slot and returns its record id.
    pub fn insert_row(&mut self, mut row: Row) -> DbResult<RecordId> {
        if **row.schema() != *self.schema {
            return Err(DbError::SchemaMismatch {
                expected: self.schema.to_string(),
                actual: row.schema().to_string(),
            });
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(DbError::PageFull {
                page_id: self.page_id,
            })?;
        // Slots past the id range are unaddressable, so the page counts as full.
        let slot_no = u16::try_from(slot).map_err(|_| DbError::PageFull {
            page_id: self.page_id,
        })?;

        let record_id = RecordId::new(self.page_id, slot_no);
        row.set_record_id(Some(record_id));
        self.slots[slot] = Some(row);
        Ok(record_id)
    }

    /// Frees the slot named by `record_id` and returns the row it held.
    pub fn delete_row(&mut self, record_id: RecordId) -> DbResult<Row> {
        let not_found = DbError::RowNotFound {
            page_id: record_id.page_id,
            slot: record_id.slot,
        };
        if record_id.page_id != self.page_id {
            return Err(not_found);
        }
        let mut row = self
            .slots
            .get_mut(usize::from(record_id.slot))
            .and_then(Option::take)
            .ok_or(not_found)?;
        row.set_record_id(None);
        Ok(row)
    }

    /// Returns the page id.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the schema of the rows on this page.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the total number of slots.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of free slots.
    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Returns true if `slot` holds a row.
    pub fn is_slot_used(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// Returns the row in `slot`.
    pub fn row(&self, slot: usize) -> Option<&Row> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Iterates over live rows in slot order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.slots.iter().flatten()
    }

    /// Marks the page dirty on behalf of `txn_id`, or clean with `None`.
    pub fn mark_dirty(&mut self, txn_id: Option<TxnId>) {
        self.dirtied_by = txn_id;
    }

    /// Returns the transaction that last dirtied this page.
    pub fn dirtied_by(&self) -> Option<TxnId> {
        self.dirtied_by
    }

    /// Returns true if the page has unwritten changes.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{FieldType, Value};
    use heapdb_common::constants::DEFAULT_PAGE_SIZE;
    use heapdb_common::types::TableId;

    fn int_schema() -> Arc<Schema> {
        Arc::new(Schema::from_types(&[FieldType::Int, FieldType::Int]).unwrap())
    }

    fn pid() -> PageId {
        PageId::new(TableId::new(1), 0)
    }

    fn row(a: i32, b: i32) -> Row {
        Row::new(int_schema(), vec![Value::Int(a), Value::Int(b)]).unwrap()
    }

    #[test]
    fn test_slot_math() {
        assert_eq!(slots_per_page(DEFAULT_PAGE_SIZE, 8), 504);
        assert_eq!(header_len(504), 63);
        assert_eq!(header_len(9), 2);

        let page = HeapPage::empty(pid(), int_schema(), DEFAULT_PAGE_SIZE);
        assert_eq!(page.num_slots(), 504);
        assert_eq!(page.free_slots(), 504);
        assert_eq!(page.encode().len(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_insert_and_delete() {
        let mut page = HeapPage::empty(pid(), int_schema(), DEFAULT_PAGE_SIZE);

        let r0 = page.insert_row(row(1, 2)).unwrap();
        let r1 = page.insert_row(row(3, 4)).unwrap();
        assert_eq!((r0.slot, r1.slot), (0, 1));
        assert_eq!(page.free_slots(), 502);

        let removed = page.delete_row(r0).unwrap();
        assert_eq!(removed, row(1, 2));
        assert!(!page.is_slot_used(0));

        // First free slot is reused.
        assert_eq!(page.insert_row(row(5, 6)).unwrap().slot, 0);

        let err = page.delete_row(RecordId::new(pid(), 7)).unwrap_err();
        assert!(matches!(err, DbError::RowNotFound { slot: 7, .. }));

        let other = RecordId::new(PageId::new(TableId::new(1), 9), 1);
        assert!(page.delete_row(other).is_err());
    }

    #[test]
    fn test_page_full() {
        let schema = Arc::new(Schema::from_types(&[FieldType::Str, FieldType::Str]).unwrap());
        let mut page = HeapPage::empty(pid(), Arc::clone(&schema), 1024);
        let slots = page.num_slots();
        assert_eq!(slots, 3);

        for i in 0..slots {
            let r = Row::new(
                Arc::clone(&schema),
                vec![Value::from(format!("a{i}")), Value::from("b")],
            )
            .unwrap();
            page.insert_row(r).unwrap();
        }
        let extra = Row::new(schema, vec![Value::from("x"), Value::from("y")]).unwrap();
        assert!(matches!(
            page.insert_row(extra),
            Err(DbError::PageFull { .. })
        ));
    }

    #[test]
    fn test_schema_mismatch() {
        let mut page = HeapPage::empty(pid(), int_schema(), DEFAULT_PAGE_SIZE);
        let other = Arc::new(Schema::from_types(&[FieldType::Int]).unwrap());
        let r = Row::new(other, vec![Value::Int(1)]).unwrap();
        assert!(matches!(
            page.insert_row(r),
            Err(DbError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut page = HeapPage::empty(pid(), int_schema(), DEFAULT_PAGE_SIZE);
        for i in 0..10 {
            page.insert_row(row(i, i * 10)).unwrap();
        }
        page.delete_row(RecordId::new(pid(), 3)).unwrap();

        let bytes = page.encode();
        // Slots 0..=9 except 3: header bytes 0b1111_0111, 0b0000_0011.
        assert_eq!(bytes[0], 0b1111_0111);
        assert_eq!(bytes[1], 0b0000_0011);

        let decoded = HeapPage::decode(pid(), int_schema(), &bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);
        assert_eq!(decoded.rows().count(), 9);
        assert_eq!(
            decoded.row(4).and_then(|r| r.record_id()),
            Some(RecordId::new(pid(), 4))
        );
        assert!(!decoded.is_dirty());
    }

    #[test]
    fn test_dirty_tracking() {
        let mut page = HeapPage::empty(pid(), int_schema(), DEFAULT_PAGE_SIZE);
        assert_eq!(page.dirtied_by(), None);
        page.mark_dirty(Some(TxnId::new(4)));
        assert!(page.is_dirty());
        assert_eq!(page.dirtied_by(), Some(TxnId::new(4)));
        page.mark_dirty(None);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_decode_corrupted_row() {
        let schema = Arc::new(Schema::from_types(&[FieldType::Str]).unwrap());
        let mut data = vec![0u8; 512];
        let slots = slots_per_page(512, schema.row_size());
        let header = header_len(slots);
        data[0] = 1;
        // Length prefix larger than the payload.
        data[header..header + 4].copy_from_slice(&1000u32.to_be_bytes());

        let err = HeapPage::decode(pid(), schema, &data).unwrap_err();
        assert!(matches!(err, DbError::PageCorrupted { .. }));
    }

    #[test]
    fn test_checked_slots() {
        assert_eq!(checked_slots(DEFAULT_PAGE_SIZE, 8).unwrap(), 504);
        // 32 string fields are 4224 bytes, wider than the page.
        assert!(checked_slots(DEFAULT_PAGE_SIZE, 32 * 132).is_err());
        // One int field on a 512 KiB page gives 127100 slots.
        assert_eq!(slots_per_page(1 << 19, 4), 127_100);
        assert!(checked_slots(1 << 19, 4).is_err());
        assert!(checked_slots(1 << 18, 4).is_ok());
    }

    #[test]
    fn test_slots_beyond_u16_do_not_wrap() {
        let schema = Arc::new(Schema::from_types(&[FieldType::Int]).unwrap());
        let page_size = 1 << 19;
        let header = header_len(slots_per_page(page_size, schema.row_size()));
        assert_eq!(header, 15_888);

        // Only slot 65536 is occupied.
        let mut data = vec![0u8; page_size];
        data[65_536 / 8] = 1;
        let err = HeapPage::decode(pid(), Arc::clone(&schema), &data).unwrap_err();
        assert!(matches!(err, DbError::PageCorrupted { .. }));

        // Slots 0..=65535 are occupied, so the next free slot has no id.
        let mut data = vec![0u8; page_size];
        data[..65_536 / 8].fill(0xFF);
        let mut page = HeapPage::decode(pid(), Arc::clone(&schema), &data).unwrap();
        assert_eq!(page.rows().count(), 65_536);
        assert_eq!(
            page.row(65_535).and_then(|r| r.record_id()),
            Some(RecordId::new(pid(), u16::MAX))
        );

        let extra = Row::new(schema, vec![Value::Int(7)]).unwrap();
        assert!(matches!(
            page.insert_row(extra),
            Err(DbError::PageFull { .. })
        ));
        assert_eq!(page.rows().count(), 65_536);
    }
}
