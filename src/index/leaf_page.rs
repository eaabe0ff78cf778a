use std::cmp::Ordering;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, SlotId, PAGE_SIZE};

use super::internal_page::InternalPage;
use super::key::{GenericKey, KeyComparator};
use super::node::{
    read_page_id, read_u16, write_page_id, write_u16, PageType, MAX_SIZE_OFFSET,
    NEXT_PAGE_ID_OFFSET, NODE_HEADER_SIZE, PAGE_ID_OFFSET, PAGE_TYPE_OFFSET,
    PARENT_PAGE_ID_OFFSET, SIZE_OFFSET,
};

/// Bytes of a serialized record id: 4-byte page id + 2-byte slot.
const RID_SIZE: usize = 6;

const fn entry_size(key_width: usize) -> usize {
    key_width + RID_SIZE
}

const fn entry_offset(key_width: usize, index: usize) -> usize {
    NODE_HEADER_SIZE + index * entry_size(key_width)
}

/// Capacity of a leaf page for the given key width.
pub const fn leaf_default_max_size(key_width: usize) -> u16 {
    ((PAGE_SIZE - NODE_HEADER_SIZE) / entry_size(key_width)) as u16
}

/// Mutable view of a leaf node: an ordered array of `(key, record id)`
/// entries plus a sibling pointer chaining leaves in ascending key order.
pub struct LeafPage<'a, const N: usize> {
    data: &'a mut [u8],
}

impl<'a, const N: usize> LeafPage<'a, N> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Formats a freshly allocated page as an empty leaf.
    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, max_size: u16) {
        self.data.fill(0);
        self.data[PAGE_TYPE_OFFSET] = PageType::Leaf.as_byte();
        write_u16(self.data, SIZE_OFFSET, 0);
        write_u16(self.data, MAX_SIZE_OFFSET, max_size);
        write_page_id(self.data, PAGE_ID_OFFSET, page_id);
        write_page_id(self.data, PARENT_PAGE_ID_OFFSET, parent_page_id);
        write_page_id(self.data, NEXT_PAGE_ID_OFFSET, crate::common::INVALID_PAGE_ID);
    }

    pub fn page_id(&self) -> PageId {
        read_page_id(self.data, PAGE_ID_OFFSET)
    }

    pub fn parent_page_id(&self) -> PageId {
        read_page_id(self.data, PARENT_PAGE_ID_OFFSET)
    }

    pub fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        write_page_id(self.data, PARENT_PAGE_ID_OFFSET, parent_page_id);
    }

    pub fn size(&self) -> u16 {
        read_u16(self.data, SIZE_OFFSET)
    }

    fn set_size(&mut self, size: u16) {
        write_u16(self.data, SIZE_OFFSET, size);
    }

    pub fn max_size(&self) -> u16 {
        read_u16(self.data, MAX_SIZE_OFFSET)
    }

    pub fn min_size(&self) -> u16 {
        (self.max_size() + 1) / 2
    }

    pub fn next_page_id(&self) -> PageId {
        read_page_id(self.data, NEXT_PAGE_ID_OFFSET)
    }

    pub fn set_next_page_id(&mut self, next_page_id: PageId) {
        write_page_id(self.data, NEXT_PAGE_ID_OFFSET, next_page_id);
    }

    pub fn key_at(&self, index: usize) -> GenericKey<N> {
        read_key::<N>(self.data, index)
    }

    pub fn item(&self, index: usize) -> (GenericKey<N>, RecordId) {
        (read_key::<N>(self.data, index), read_rid::<N>(self.data, index))
    }

    /// First slot whose key is >= the probe, or None when every key is
    /// smaller.
    pub fn key_index<C: KeyComparator>(&self, key: &GenericKey<N>, comparator: &C) -> Option<usize> {
        leaf_key_index::<N, C>(self.data, key, comparator)
    }

    /// Inserts an entry keeping the array ordered. A duplicate key leaves
    /// the page untouched. Returns the resulting size.
    pub fn insert<C: KeyComparator>(
        &mut self,
        key: &GenericKey<N>,
        rid: RecordId,
        comparator: &C,
    ) -> u16 {
        let size = self.size() as usize;
        let index = match self.key_index(key, comparator) {
            Some(index) => {
                if comparator.compare(self.key_at(index).as_bytes(), key.as_bytes())
                    == Ordering::Equal
                {
                    return size as u16;
                }
                index
            }
            None => size,
        };

        self.data.copy_within(
            entry_offset(N, index)..entry_offset(N, size),
            entry_offset(N, index + 1),
        );
        self.write_entry(index, key, rid);
        self.set_size(size as u16 + 1);
        size as u16 + 1
    }

    pub fn lookup<C: KeyComparator>(
        &self,
        key: &GenericKey<N>,
        comparator: &C,
    ) -> Option<RecordId> {
        leaf_lookup::<N, C>(self.data, key, comparator)
    }

    /// Removes the entry for a key if present, compacting the array.
    /// Returns the resulting size.
    pub fn remove_and_delete_record<C: KeyComparator>(
        &mut self,
        key: &GenericKey<N>,
        comparator: &C,
    ) -> u16 {
        let size = self.size() as usize;
        if let Some(index) = self.key_index(key, comparator) {
            if comparator.compare(self.key_at(index).as_bytes(), key.as_bytes()) == Ordering::Equal
            {
                self.data.copy_within(
                    entry_offset(N, index + 1)..entry_offset(N, size),
                    entry_offset(N, index),
                );
                self.set_size(size as u16 - 1);
            }
        }
        self.size()
    }

    /// Moves the upper half of this page's entries to an empty recipient.
    pub fn move_half_to(&mut self, recipient: &mut LeafPage<'_, N>) {
        let size = self.size() as usize;
        let half = size / 2;
        let moved = size - half;

        recipient.data[entry_offset(N, 0)..entry_offset(N, moved)]
            .copy_from_slice(&self.data[entry_offset(N, half)..entry_offset(N, size)]);
        recipient.set_size(moved as u16);
        self.set_size(half as u16);
    }

    /// Moves every entry to the recipient (its left sibling) and hands it
    /// this page's successor, keeping the leaf chain intact.
    pub fn move_all_to(&mut self, recipient: &mut LeafPage<'_, N>) {
        let size = self.size() as usize;
        let recipient_size = recipient.size() as usize;

        recipient.data
            [entry_offset(N, recipient_size)..entry_offset(N, recipient_size + size)]
            .copy_from_slice(&self.data[entry_offset(N, 0)..entry_offset(N, size)]);
        recipient.set_size((recipient_size + size) as u16);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Moves this page's first entry to the tail of the recipient (its
    /// left sibling), then rewrites the parent separator at slot 1 to the
    /// new first key of this page.
    pub fn move_first_to_end_of(
        &mut self,
        recipient: &mut LeafPage<'_, N>,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size() as usize;
        let (key, rid) = self.item(0);

        let recipient_size = recipient.size() as usize;
        recipient.write_entry(recipient_size, &key, rid);
        recipient.set_size(recipient_size as u16 + 1);

        self.data.copy_within(
            entry_offset(N, 1)..entry_offset(N, size),
            entry_offset(N, 0),
        );
        self.set_size(size as u16 - 1);

        let parent_id = self.parent_page_id();
        let parent_frame = bpm.fetch_page(parent_id)?;
        {
            let mut parent_data = parent_frame.write_data();
            let mut parent = InternalPage::<N>::new(&mut parent_data[..]);
            parent.set_key_at(1, &self.key_at(0));
        }
        bpm.unpin_page(parent_id, true);
        Ok(())
    }

    /// Moves this page's last entry to the head of the recipient (its
    /// right sibling), then rewrites the parent separator at
    /// `parent_index` to the moved key.
    pub fn move_last_to_front_of(
        &mut self,
        recipient: &mut LeafPage<'_, N>,
        parent_index: usize,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size() as usize;
        let (key, rid) = self.item(size - 1);
        self.set_size(size as u16 - 1);

        let recipient_size = recipient.size() as usize;
        recipient.data.copy_within(
            entry_offset(N, 0)..entry_offset(N, recipient_size),
            entry_offset(N, 1),
        );
        recipient.write_entry(0, &key, rid);
        recipient.set_size(recipient_size as u16 + 1);

        let parent_id = self.parent_page_id();
        let parent_frame = bpm.fetch_page(parent_id)?;
        {
            let mut parent_data = parent_frame.write_data();
            let mut parent = InternalPage::<N>::new(&mut parent_data[..]);
            parent.set_key_at(parent_index, &key);
        }
        bpm.unpin_page(parent_id, true);
        Ok(())
    }

    fn write_entry(&mut self, index: usize, key: &GenericKey<N>, rid: RecordId) {
        let offset = entry_offset(N, index);
        self.data[offset..offset + N].copy_from_slice(key.as_bytes());
        self.data[offset + N..offset + N + 4]
            .copy_from_slice(&rid.page_id.as_i32().to_le_bytes());
        self.data[offset + N + 4..offset + N + 6]
            .copy_from_slice(&rid.slot_id.as_u16().to_le_bytes());
    }
}

/// Read-only view of a leaf node.
pub struct LeafPageRef<'a, const N: usize> {
    data: &'a [u8],
}

impl<'a, const N: usize> LeafPageRef<'a, N> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn size(&self) -> u16 {
        read_u16(self.data, SIZE_OFFSET)
    }

    pub fn next_page_id(&self) -> PageId {
        read_page_id(self.data, NEXT_PAGE_ID_OFFSET)
    }

    pub fn key_at(&self, index: usize) -> GenericKey<N> {
        read_key::<N>(self.data, index)
    }

    pub fn item(&self, index: usize) -> (GenericKey<N>, RecordId) {
        (read_key::<N>(self.data, index), read_rid::<N>(self.data, index))
    }

    pub fn key_index<C: KeyComparator>(&self, key: &GenericKey<N>, comparator: &C) -> Option<usize> {
        leaf_key_index::<N, C>(self.data, key, comparator)
    }

    pub fn lookup<C: KeyComparator>(
        &self,
        key: &GenericKey<N>,
        comparator: &C,
    ) -> Option<RecordId> {
        leaf_lookup::<N, C>(self.data, key, comparator)
    }
}

fn read_key<const N: usize>(data: &[u8], index: usize) -> GenericKey<N> {
    let offset = entry_offset(N, index);
    GenericKey::from_slice(&data[offset..offset + N])
}

fn read_rid<const N: usize>(data: &[u8], index: usize) -> RecordId {
    let offset = entry_offset(N, index) + N;
    let page_id = i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
    let slot_id = u16::from_le_bytes(data[offset + 4..offset + 6].try_into().unwrap());
    RecordId::new(PageId::new(page_id), SlotId::new(slot_id))
}

fn leaf_key_index<const N: usize, C: KeyComparator>(
    data: &[u8],
    key: &GenericKey<N>,
    comparator: &C,
) -> Option<usize> {
    let size = read_u16(data, SIZE_OFFSET) as usize;
    (0..size).find(|&i| {
        comparator.compare(read_key::<N>(data, i).as_bytes(), key.as_bytes()) != Ordering::Less
    })
}

fn leaf_lookup<const N: usize, C: KeyComparator>(
    data: &[u8],
    key: &GenericKey<N>,
    comparator: &C,
) -> Option<RecordId> {
    let index = leaf_key_index::<N, C>(data, key, comparator)?;
    if comparator.compare(read_key::<N>(data, index).as_bytes(), key.as_bytes()) == Ordering::Equal
    {
        Some(read_rid::<N>(data, index))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INVALID_PAGE_ID;
    use crate::index::key::Int64Comparator;

    fn rid(n: i32) -> RecordId {
        RecordId::new(PageId::new(n), SlotId::new(0))
    }

    fn key(n: i64) -> GenericKey<8> {
        GenericKey::from_i64(n)
    }

    #[test]
    fn test_leaf_insert_ordered() {
        let cmp = Int64Comparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut leaf = LeafPage::<8>::new(&mut data);
        leaf.init(PageId::new(1), INVALID_PAGE_ID, 8);

        assert_eq!(leaf.insert(&key(20), rid(20), &cmp), 1);
        assert_eq!(leaf.insert(&key(10), rid(10), &cmp), 2);
        assert_eq!(leaf.insert(&key(30), rid(30), &cmp), 3);

        assert_eq!(leaf.key_at(0), key(10));
        assert_eq!(leaf.key_at(1), key(20));
        assert_eq!(leaf.key_at(2), key(30));
    }

    #[test]
    fn test_leaf_insert_duplicate_is_noop() {
        let cmp = Int64Comparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut leaf = LeafPage::<8>::new(&mut data);
        leaf.init(PageId::new(1), INVALID_PAGE_ID, 8);

        leaf.insert(&key(10), rid(10), &cmp);
        assert_eq!(leaf.insert(&key(10), rid(99), &cmp), 1);
        assert_eq!(leaf.lookup(&key(10), &cmp), Some(rid(10)));
    }

    #[test]
    fn test_leaf_lookup_and_remove() {
        let cmp = Int64Comparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut leaf = LeafPage::<8>::new(&mut data);
        leaf.init(PageId::new(1), INVALID_PAGE_ID, 8);

        for i in [5i64, 1, 3] {
            leaf.insert(&key(i), rid(i as i32), &cmp);
        }

        assert_eq!(leaf.lookup(&key(3), &cmp), Some(rid(3)));
        assert_eq!(leaf.lookup(&key(4), &cmp), None);

        assert_eq!(leaf.remove_and_delete_record(&key(3), &cmp), 2);
        assert_eq!(leaf.lookup(&key(3), &cmp), None);
        assert_eq!(leaf.key_at(0), key(1));
        assert_eq!(leaf.key_at(1), key(5));

        // Removing a missing key is a no-op
        assert_eq!(leaf.remove_and_delete_record(&key(42), &cmp), 2);
    }

    #[test]
    fn test_leaf_key_index() {
        let cmp = Int64Comparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut leaf = LeafPage::<8>::new(&mut data);
        leaf.init(PageId::new(1), INVALID_PAGE_ID, 8);

        for i in [10i64, 20, 30] {
            leaf.insert(&key(i), rid(i as i32), &cmp);
        }

        assert_eq!(leaf.key_index(&key(5), &cmp), Some(0));
        assert_eq!(leaf.key_index(&key(20), &cmp), Some(1));
        assert_eq!(leaf.key_index(&key(25), &cmp), Some(2));
        assert_eq!(leaf.key_index(&key(35), &cmp), None);
    }

    #[test]
    fn test_leaf_move_half_to() {
        let cmp = Int64Comparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut other = [0u8; PAGE_SIZE];

        let mut leaf = LeafPage::<8>::new(&mut data);
        leaf.init(PageId::new(1), INVALID_PAGE_ID, 8);
        for i in 1..=4i64 {
            leaf.insert(&key(i), rid(i as i32), &cmp);
        }

        let mut recipient = LeafPage::<8>::new(&mut other);
        recipient.init(PageId::new(2), INVALID_PAGE_ID, 8);

        leaf.move_half_to(&mut recipient);

        assert_eq!(leaf.size(), 2);
        assert_eq!(recipient.size(), 2);
        assert_eq!(leaf.key_at(0), key(1));
        assert_eq!(recipient.key_at(0), key(3));
        assert_eq!(recipient.item(1), (key(4), rid(4)));
    }

    #[test]
    fn test_leaf_move_all_to_keeps_chain() {
        let cmp = Int64Comparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut other = [0u8; PAGE_SIZE];

        let mut right = LeafPage::<8>::new(&mut data);
        right.init(PageId::new(2), INVALID_PAGE_ID, 8);
        right.set_next_page_id(PageId::new(9));
        for i in [3i64, 4] {
            right.insert(&key(i), rid(i as i32), &cmp);
        }

        let mut left = LeafPage::<8>::new(&mut other);
        left.init(PageId::new(1), INVALID_PAGE_ID, 8);
        left.set_next_page_id(PageId::new(2));
        for i in [1i64, 2] {
            left.insert(&key(i), rid(i as i32), &cmp);
        }

        right.move_all_to(&mut left);

        assert_eq!(right.size(), 0);
        assert_eq!(left.size(), 4);
        assert_eq!(left.next_page_id(), PageId::new(9));
        for (i, expect) in (1i64..=4).enumerate() {
            assert_eq!(left.key_at(i), key(expect));
        }
    }
}
