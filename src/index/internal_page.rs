use std::cmp::Ordering;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, Result, PAGE_SIZE};

use super::key::{GenericKey, KeyComparator};
use super::node::{
    read_page_id, read_u16, write_page_id, write_parent_page_id, write_u16, PageType,
    MAX_SIZE_OFFSET, NODE_HEADER_SIZE, PAGE_ID_OFFSET, PAGE_TYPE_OFFSET, PARENT_PAGE_ID_OFFSET,
    SIZE_OFFSET,
};

/// Child pointers are stored as 4-byte LE page ids.
const CHILD_SIZE: usize = 4;

const fn entry_size(key_width: usize) -> usize {
    key_width + CHILD_SIZE
}

const fn entry_offset(key_width: usize, index: usize) -> usize {
    NODE_HEADER_SIZE + index * entry_size(key_width)
}

/// Capacity of an internal page for the given key width.
pub const fn internal_default_max_size(key_width: usize) -> u16 {
    ((PAGE_SIZE - NODE_HEADER_SIZE) / entry_size(key_width)) as u16
}

/// Mutable view of an internal node: an array of `(key, child)` entries
/// where slot 0's key is unused and slot 0's child covers everything
/// below the first separator.
pub struct InternalPage<'a, const N: usize> {
    data: &'a mut [u8],
}

impl<'a, const N: usize> InternalPage<'a, N> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Formats a freshly allocated page as an empty internal node.
    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, max_size: u16) {
        self.data.fill(0);
        self.data[PAGE_TYPE_OFFSET] = PageType::Internal.as_byte();
        write_u16(self.data, SIZE_OFFSET, 0);
        write_u16(self.data, MAX_SIZE_OFFSET, max_size);
        write_page_id(self.data, PAGE_ID_OFFSET, page_id);
        write_page_id(self.data, PARENT_PAGE_ID_OFFSET, parent_page_id);
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

    pub fn key_at(&self, index: usize) -> GenericKey<N> {
        read_key::<N>(self.data, index)
    }

    pub fn set_key_at(&mut self, index: usize, key: &GenericKey<N>) {
        let offset = entry_offset(N, index);
        self.data[offset..offset + N].copy_from_slice(key.as_bytes());
    }

    pub fn value_at(&self, index: usize) -> PageId {
        read_child::<N>(self.data, index)
    }

    fn set_value_at(&mut self, index: usize, child: PageId) {
        let offset = entry_offset(N, index) + N;
        self.data[offset..offset + 4].copy_from_slice(&child.as_i32().to_le_bytes());
    }

    /// Slot holding the given child page id, if any.
    pub fn value_index(&self, value: PageId) -> Option<usize> {
        internal_value_index::<N>(self.data, value)
    }

    /// Child covering the probe key: the entry before the first separator
    /// greater than the key, or the last child when no separator is.
    pub fn lookup<C: KeyComparator>(&self, key: &GenericKey<N>, comparator: &C) -> PageId {
        internal_lookup::<N, C>(self.data, key, comparator)
    }

    /// Seeds a freshly allocated root after the old root split: slot 0
    /// keeps the old root, slot 1 holds the separator and the new node.
    pub fn populate_new_root(
        &mut self,
        old_child: PageId,
        new_key: &GenericKey<N>,
        new_child: PageId,
    ) {
        self.set_value_at(0, old_child);
        self.set_key_at(1, new_key);
        self.set_value_at(1, new_child);
        self.set_size(2);
    }

    /// Inserts `(new_key, new_child)` immediately after the entry whose
    /// child is `old_child`. A missing `old_child` leaves the page
    /// untouched. Returns the resulting size.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        new_key: &GenericKey<N>,
        new_child: PageId,
    ) -> u16 {
        let size = self.size() as usize;
        if let Some(old_index) = self.value_index(old_child) {
            let index = old_index + 1;
            self.data.copy_within(
                entry_offset(N, index)..entry_offset(N, size),
                entry_offset(N, index + 1),
            );
            self.set_key_at(index, new_key);
            self.set_value_at(index, new_child);
            self.set_size(size as u16 + 1);
        }
        self.size()
    }

    /// Removes the entry at `index`, compacting the array.
    pub fn remove(&mut self, index: usize) {
        let size = self.size() as usize;
        self.data.copy_within(
            entry_offset(N, index + 1)..entry_offset(N, size),
            entry_offset(N, index),
        );
        self.set_size(size as u16 - 1);
    }

    /// Empties a size-1 root during root collapse, returning its sole
    /// surviving child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    /// Moves the upper half of this page's entries to an empty recipient
    /// and reparents every moved child.
    pub fn move_half_to(
        &mut self,
        recipient: &mut InternalPage<'_, N>,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size() as usize;
        let half = size / 2;
        let moved = size - half;

        recipient.data[entry_offset(N, 0)..entry_offset(N, moved)]
            .copy_from_slice(&self.data[entry_offset(N, half)..entry_offset(N, size)]);
        recipient.set_size(moved as u16);
        self.set_size(half as u16);

        let recipient_id = recipient.page_id();
        for i in 0..moved {
            reparent_child(bpm, recipient.value_at(i), recipient_id)?;
        }
        Ok(())
    }

    /// Moves every entry to the recipient (its left sibling). Slot 0's
    /// key is first filled in from the parent separator at
    /// `index_in_parent` so the merged array keeps valid separators, and
    /// every moved child is reparented.
    pub fn move_all_to(
        &mut self,
        recipient: &mut InternalPage<'_, N>,
        index_in_parent: usize,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let parent_id = self.parent_page_id();
        let parent_frame = bpm.fetch_page(parent_id)?;
        let separator = {
            let parent_data = parent_frame.read_data();
            InternalPageRef::<N>::new(&parent_data[..]).key_at(index_in_parent)
        };
        bpm.unpin_page(parent_id, false);
        self.set_key_at(0, &separator);

        let size = self.size() as usize;
        let recipient_size = recipient.size() as usize;
        recipient.data
            [entry_offset(N, recipient_size)..entry_offset(N, recipient_size + size)]
            .copy_from_slice(&self.data[entry_offset(N, 0)..entry_offset(N, size)]);
        recipient.set_size((recipient_size + size) as u16);
        self.set_size(0);

        let recipient_id = recipient.page_id();
        for i in recipient_size..recipient_size + size {
            reparent_child(bpm, recipient.value_at(i), recipient_id)?;
        }
        Ok(())
    }

    /// Moves this page's first child to the tail of the recipient (its
    /// left sibling). The parent separator at slot 1 comes down as the
    /// appended entry's key, and this page's old first separator goes up
    /// in its place.
    pub fn move_first_to_end_of(
        &mut self,
        recipient: &mut InternalPage<'_, N>,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let moved_key = self.key_at(1);
        let moved_child = self.value_at(0);
        self.remove(0);

        let parent_id = self.parent_page_id();
        let parent_frame = bpm.fetch_page(parent_id)?;
        {
            let mut parent_data = parent_frame.write_data();
            let mut parent = InternalPage::<N>::new(&mut parent_data[..]);
            let separator = parent.key_at(1);
            let recipient_size = recipient.size() as usize;
            recipient.set_key_at(recipient_size, &separator);
            recipient.set_value_at(recipient_size, moved_child);
            recipient.set_size(recipient_size as u16 + 1);
            parent.set_key_at(1, &moved_key);
        }
        bpm.unpin_page(parent_id, true);

        reparent_child(bpm, moved_child, recipient.page_id())
    }

    /// Moves this page's last child to the head of the recipient (its
    /// right sibling). The parent separator at `parent_index` comes down
    /// as the recipient's new slot-1 key, and the moved entry's key goes
    /// up in its place.
    pub fn move_last_to_front_of(
        &mut self,
        recipient: &mut InternalPage<'_, N>,
        parent_index: usize,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size() as usize;
        let moved_key = self.key_at(size - 1);
        let moved_child = self.value_at(size - 1);
        self.set_size(size as u16 - 1);

        let parent_id = self.parent_page_id();
        let parent_frame = bpm.fetch_page(parent_id)?;
        {
            let mut parent_data = parent_frame.write_data();
            let mut parent = InternalPage::<N>::new(&mut parent_data[..]);
            let recipient_size = recipient.size() as usize;
            recipient.data.copy_within(
                entry_offset(N, 0)..entry_offset(N, recipient_size),
                entry_offset(N, 1),
            );
            recipient.set_value_at(0, moved_child);
            recipient.set_key_at(1, &parent.key_at(parent_index));
            recipient.set_size(recipient_size as u16 + 1);
            parent.set_key_at(parent_index, &moved_key);
        }
        bpm.unpin_page(parent_id, true);

        reparent_child(bpm, moved_child, recipient.page_id())
    }
}

/// Read-only view of an internal node.
pub struct InternalPageRef<'a, const N: usize> {
    data: &'a [u8],
}

impl<'a, const N: usize> InternalPageRef<'a, N> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn size(&self) -> u16 {
        read_u16(self.data, SIZE_OFFSET)
    }

    pub fn key_at(&self, index: usize) -> GenericKey<N> {
        read_key::<N>(self.data, index)
    }

    pub fn value_at(&self, index: usize) -> PageId {
        read_child::<N>(self.data, index)
    }

    pub fn value_index(&self, value: PageId) -> Option<usize> {
        internal_value_index::<N>(self.data, value)
    }

    pub fn lookup<C: KeyComparator>(&self, key: &GenericKey<N>, comparator: &C) -> PageId {
        internal_lookup::<N, C>(self.data, key, comparator)
    }
}

fn read_key<const N: usize>(data: &[u8], index: usize) -> GenericKey<N> {
    let offset = entry_offset(N, index);
    GenericKey::from_slice(&data[offset..offset + N])
}

fn read_child<const N: usize>(data: &[u8], index: usize) -> PageId {
    let offset = entry_offset(N, index) + N;
    PageId::new(i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()))
}

fn internal_value_index<const N: usize>(data: &[u8], value: PageId) -> Option<usize> {
    let size = read_u16(data, SIZE_OFFSET) as usize;
    (0..size).find(|&i| read_child::<N>(data, i) == value)
}

fn internal_lookup<const N: usize, C: KeyComparator>(
    data: &[u8],
    key: &GenericKey<N>,
    comparator: &C,
) -> PageId {
    let size = read_u16(data, SIZE_OFFSET) as usize;
    for i in 1..size {
        if comparator.compare(key.as_bytes(), read_key::<N>(data, i).as_bytes()) == Ordering::Less {
            return read_child::<N>(data, i - 1);
        }
    }
    read_child::<N>(data, size - 1)
}

fn reparent_child(bpm: &BufferPoolManager, child_id: PageId, parent_id: PageId) -> Result<()> {
    let child_frame = bpm.fetch_page(child_id)?;
    {
        let mut child_data = child_frame.write_data();
        write_parent_page_id(&mut child_data[..], parent_id);
    }
    bpm.unpin_page(child_id, true);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INVALID_PAGE_ID;
    use crate::index::key::Int64Comparator;

    fn key(n: i64) -> GenericKey<8> {
        GenericKey::from_i64(n)
    }

    #[test]
    fn test_internal_populate_new_root() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = InternalPage::<8>::new(&mut data);
        node.init(PageId::new(3), INVALID_PAGE_ID, 5);

        node.populate_new_root(PageId::new(1), &key(10), PageId::new(2));

        assert_eq!(node.size(), 2);
        assert_eq!(node.value_at(0), PageId::new(1));
        assert_eq!(node.key_at(1), key(10));
        assert_eq!(node.value_at(1), PageId::new(2));
    }

    #[test]
    fn test_internal_lookup_routes_by_separator() {
        let cmp = Int64Comparator;
        let mut data = [0u8; PAGE_SIZE];
        let mut node = InternalPage::<8>::new(&mut data);
        node.init(PageId::new(9), INVALID_PAGE_ID, 5);

        node.populate_new_root(PageId::new(1), &key(10), PageId::new(2));
        node.insert_node_after(PageId::new(2), &key(20), PageId::new(3));

        assert_eq!(node.lookup(&key(5), &cmp), PageId::new(1));
        assert_eq!(node.lookup(&key(10), &cmp), PageId::new(2));
        assert_eq!(node.lookup(&key(15), &cmp), PageId::new(2));
        assert_eq!(node.lookup(&key(20), &cmp), PageId::new(3));
        assert_eq!(node.lookup(&key(99), &cmp), PageId::new(3));
    }

    #[test]
    fn test_internal_insert_node_after() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = InternalPage::<8>::new(&mut data);
        node.init(PageId::new(9), INVALID_PAGE_ID, 5);

        node.populate_new_root(PageId::new(1), &key(30), PageId::new(3));
        assert_eq!(node.insert_node_after(PageId::new(1), &key(20), PageId::new(2)), 3);

        assert_eq!(node.value_at(0), PageId::new(1));
        assert_eq!(node.key_at(1), key(20));
        assert_eq!(node.value_at(1), PageId::new(2));
        assert_eq!(node.key_at(2), key(30));
        assert_eq!(node.value_at(2), PageId::new(3));

        // Unknown anchor leaves the node untouched
        assert_eq!(node.insert_node_after(PageId::new(77), &key(40), PageId::new(4)), 3);
    }

    #[test]
    fn test_internal_value_index_and_remove() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = InternalPage::<8>::new(&mut data);
        node.init(PageId::new(9), INVALID_PAGE_ID, 5);

        node.populate_new_root(PageId::new(1), &key(10), PageId::new(2));
        node.insert_node_after(PageId::new(2), &key(20), PageId::new(3));

        assert_eq!(node.value_index(PageId::new(2)), Some(1));
        assert_eq!(node.value_index(PageId::new(42)), None);

        node.remove(1);
        assert_eq!(node.size(), 2);
        assert_eq!(node.value_at(0), PageId::new(1));
        assert_eq!(node.value_at(1), PageId::new(3));
        assert_eq!(node.key_at(1), key(20));
    }

    #[test]
    fn test_internal_remove_and_return_only_child() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = InternalPage::<8>::new(&mut data);
        node.init(PageId::new(9), INVALID_PAGE_ID, 5);

        node.populate_new_root(PageId::new(1), &key(10), PageId::new(2));
        node.remove(1);

        assert_eq!(node.remove_and_return_only_child(), PageId::new(1));
        assert_eq!(node.size(), 0);
    }
}
