use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::{BufferPoolManager, Frame};
use crate::common::{
    CairnError, PageId, RecordId, Result, Transaction, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::HeaderPage;

use super::index_iterator::IndexIterator;
use super::internal_page::{internal_default_max_size, InternalPage, InternalPageRef};
use super::key::{GenericKey, KeyComparator};
use super::leaf_page::{leaf_default_max_size, LeafPage, LeafPageRef};
use super::node::{write_parent_page_id, NodeRef};

/// Disk-resident B+ tree index over buffer-pool pages.
///
/// The root page id is persisted in the header page (page 0) under the
/// index name, so a tree can be reopened against an existing file. Every
/// page fetched during an operation is unpinned on every control-flow
/// path; tree mutations are not internally latched and must be
/// serialized by the caller (the `Transaction` parameter is reserved for
/// future latch crabbing).
pub struct BPlusTree<C: KeyComparator, const N: usize> {
    index_name: String,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: u16,
    internal_max_size: u16,
}

impl<C: KeyComparator, const N: usize> BPlusTree<C, N> {
    /// Creates an empty tree. Node capacities default to what a page can
    /// hold for this key width.
    pub fn new(index_name: impl Into<String>, bpm: Arc<BufferPoolManager>, comparator: C) -> Self {
        Self::open(index_name, bpm, comparator, INVALID_PAGE_ID)
    }

    /// Attaches to a tree whose root page id is already known (e.g. read
    /// back from the header page).
    pub fn open(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        root_page_id: PageId,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            root_page_id,
            bpm,
            comparator,
            leaf_max_size: leaf_default_max_size(N),
            internal_max_size: internal_default_max_size(N),
        }
    }

    /// Overrides node capacities. Small capacities force splits and
    /// merges after a handful of entries, which is what the tests use.
    pub fn with_node_capacity(mut self, leaf_max_size: u16, internal_max_size: u16) -> Self {
        assert!(leaf_max_size >= 2 && internal_max_size >= 3);
        self.leaf_max_size = leaf_max_size;
        self.internal_max_size = internal_max_size;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.is_valid()
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Point lookup. Returns the record id stored under the key, if any.
    pub fn get_value(
        &self,
        key: &GenericKey<N>,
        _transaction: Option<&Transaction>,
    ) -> Result<Option<RecordId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let (leaf_id, leaf_frame) = self.find_leaf_page(key, false)?;
        let result = {
            let data = leaf_frame.read_data();
            LeafPageRef::<N>::new(&data[..]).lookup(key, &self.comparator)
        };
        self.bpm.unpin_page(leaf_id, false);
        Ok(result)
    }

    /// Inserts a unique key. Returns false (leaving the tree unchanged)
    /// when the key is already present.
    pub fn insert(
        &mut self,
        key: &GenericKey<N>,
        rid: RecordId,
        _transaction: Option<&Transaction>,
    ) -> Result<bool> {
        if self.is_empty() {
            self.start_new_tree(key, rid)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, rid)
    }

    /// Deletes a key if present, rebalancing underflowed nodes by
    /// redistribution or coalescing.
    pub fn remove(&mut self, key: &GenericKey<N>, _transaction: Option<&Transaction>) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let (leaf_id, leaf_frame) = self.find_leaf_page(key, false)?;
        let found = {
            let mut data = leaf_frame.write_data();
            let mut leaf = LeafPage::<N>::new(&mut data[..]);
            if leaf.lookup(key, &self.comparator).is_some() {
                leaf.remove_and_delete_record(key, &self.comparator);
                true
            } else {
                false
            }
        };
        if found {
            self.coalesce_or_redistribute(leaf_id, &leaf_frame)?;
        } else {
            self.bpm.unpin_page(leaf_id, false);
        }
        Ok(())
    }

    /// Iterator positioned at the first entry of the leftmost leaf.
    pub fn begin(&self) -> Result<IndexIterator<N>> {
        if self.is_empty() {
            return Ok(IndexIterator::at_end(Arc::clone(&self.bpm)));
        }
        // The probe key is ignored during a left-most descent.
        let probe = GenericKey::default();
        let (leaf_id, leaf_frame) = self.find_leaf_page(&probe, true)?;
        Ok(IndexIterator::new(
            Arc::clone(&self.bpm),
            leaf_id,
            leaf_frame,
            0,
        ))
    }

    /// Iterator positioned at the first entry with key >= the probe.
    pub fn begin_at(&self, key: &GenericKey<N>) -> Result<IndexIterator<N>> {
        if self.is_empty() {
            return Ok(IndexIterator::at_end(Arc::clone(&self.bpm)));
        }
        let (leaf_id, leaf_frame) = self.find_leaf_page(key, false)?;
        let index = {
            let data = leaf_frame.read_data();
            LeafPageRef::<N>::new(&data[..]).key_index(key, &self.comparator)
        };
        match index {
            Some(index) => Ok(IndexIterator::new(
                Arc::clone(&self.bpm),
                leaf_id,
                leaf_frame,
                index,
            )),
            None => {
                self.bpm.unpin_page(leaf_id, false);
                Ok(IndexIterator::at_end(Arc::clone(&self.bpm)))
            }
        }
    }

    /// Descends from the root to the leaf that would contain the key,
    /// unpinning interior nodes along the way. The returned leaf stays
    /// pinned for the caller.
    fn find_leaf_page(
        &self,
        key: &GenericKey<N>,
        left_most: bool,
    ) -> Result<(PageId, Arc<Frame>)> {
        let mut page_id = self.root_page_id;
        let mut frame = self.bpm.fetch_page(page_id)?;
        loop {
            let child = {
                let data = frame.read_data();
                let node = NodeRef::new(&data[..]);
                if node.is_leaf() {
                    None
                } else {
                    let internal = InternalPageRef::<N>::new(&data[..]);
                    Some(if left_most {
                        internal.value_at(0)
                    } else {
                        internal.lookup(key, &self.comparator)
                    })
                }
            };
            let Some(child) = child else {
                return Ok((page_id, frame));
            };
            self.bpm.unpin_page(page_id, false);
            page_id = child;
            frame = self.bpm.fetch_page(page_id)?;
        }
    }

    fn start_new_tree(&mut self, key: &GenericKey<N>, rid: RecordId) -> Result<()> {
        let (page_id, frame) = self.bpm.new_page()?;
        {
            let mut data = frame.write_data();
            let mut leaf = LeafPage::<N>::new(&mut data[..]);
            leaf.init(page_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key, rid, &self.comparator);
        }
        self.root_page_id = page_id;
        self.update_root_page_id(true)?;
        self.bpm.unpin_page(page_id, true);
        debug!(index = %self.index_name, root = %page_id, "started new tree");
        Ok(())
    }

    fn insert_into_leaf(&mut self, key: &GenericKey<N>, rid: RecordId) -> Result<bool> {
        let (leaf_id, leaf_frame) = self.find_leaf_page(key, false)?;

        enum Outcome {
            Duplicate,
            Inserted,
            NeedsSplit,
        }

        let outcome = {
            let mut data = leaf_frame.write_data();
            let mut leaf = LeafPage::<N>::new(&mut data[..]);
            if leaf.lookup(key, &self.comparator).is_some() {
                Outcome::Duplicate
            } else if leaf.size() < leaf.max_size() {
                leaf.insert(key, rid, &self.comparator);
                Outcome::Inserted
            } else {
                Outcome::NeedsSplit
            }
        };

        match outcome {
            Outcome::Duplicate => {
                self.bpm.unpin_page(leaf_id, false);
                Ok(false)
            }
            Outcome::Inserted => {
                self.bpm.unpin_page(leaf_id, true);
                Ok(true)
            }
            Outcome::NeedsSplit => {
                let (new_leaf_id, new_leaf_frame) = self.split_leaf(&leaf_frame)?;
                debug!(index = %self.index_name, leaf = %leaf_id, new_leaf = %new_leaf_id, "split leaf");
                let separator = {
                    let mut leaf_data = leaf_frame.write_data();
                    let mut new_data = new_leaf_frame.write_data();
                    let mut leaf = LeafPage::<N>::new(&mut leaf_data[..]);
                    let mut new_leaf = LeafPage::<N>::new(&mut new_data[..]);

                    let goes_left = self
                        .comparator
                        .compare(key.as_bytes(), new_leaf.key_at(0).as_bytes())
                        == Ordering::Less;
                    if goes_left {
                        leaf.insert(key, rid, &self.comparator);
                    } else {
                        new_leaf.insert(key, rid, &self.comparator);
                    }

                    // splice the new leaf into the sibling chain
                    new_leaf.set_next_page_id(leaf.next_page_id());
                    leaf.set_next_page_id(new_leaf_id);
                    new_leaf.key_at(0)
                };
                self.insert_into_parent(leaf_id, &leaf_frame, separator, new_leaf_id, &new_leaf_frame)?;
                Ok(true)
            }
        }
    }

    /// Allocates a sibling leaf inheriting the parent pointer and moves
    /// the upper half of the entries into it. The new leaf is returned
    /// pinned.
    fn split_leaf(&mut self, leaf_frame: &Arc<Frame>) -> Result<(PageId, Arc<Frame>)> {
        let (new_id, new_frame) = self.bpm.new_page()?;
        {
            let mut leaf_data = leaf_frame.write_data();
            let mut new_data = new_frame.write_data();
            let mut leaf = LeafPage::<N>::new(&mut leaf_data[..]);
            let mut new_leaf = LeafPage::<N>::new(&mut new_data[..]);
            new_leaf.init(new_id, leaf.parent_page_id(), self.leaf_max_size);
            leaf.move_half_to(&mut new_leaf);
        }
        Ok((new_id, new_frame))
    }

    /// Internal-node counterpart of `split_leaf`; moved children are
    /// reparented to the new node.
    fn split_internal(&mut self, node_frame: &Arc<Frame>) -> Result<(PageId, Arc<Frame>)> {
        let (new_id, new_frame) = self.bpm.new_page()?;
        {
            let mut node_data = node_frame.write_data();
            let mut new_data = new_frame.write_data();
            let mut node = InternalPage::<N>::new(&mut node_data[..]);
            let mut new_node = InternalPage::<N>::new(&mut new_data[..]);
            new_node.init(new_id, node.parent_page_id(), self.internal_max_size);
            node.move_half_to(&mut new_node, self.bpm.as_ref())?;
        }
        Ok((new_id, new_frame))
    }

    /// Links a freshly split-off node into the tree. Consumes the pins on
    /// `old` and `new` on every path; recursion consumes the parent pins.
    fn insert_into_parent(
        &mut self,
        old_id: PageId,
        old_frame: &Arc<Frame>,
        key: GenericKey<N>,
        new_id: PageId,
        new_frame: &Arc<Frame>,
    ) -> Result<()> {
        let parent_id = {
            let data = old_frame.read_data();
            NodeRef::new(&data[..]).parent_page_id()
        };

        if !parent_id.is_valid() {
            // the old node was the root: grow the tree by one level
            let (root_id, root_frame) = self.bpm.new_page()?;
            {
                let mut root_data = root_frame.write_data();
                let mut root = InternalPage::<N>::new(&mut root_data[..]);
                root.init(root_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(old_id, &key, new_id);
            }
            {
                let mut old_data = old_frame.write_data();
                write_parent_page_id(&mut old_data[..], root_id);
            }
            {
                let mut new_data = new_frame.write_data();
                write_parent_page_id(&mut new_data[..], root_id);
            }
            self.root_page_id = root_id;
            self.update_root_page_id(false)?;
            self.bpm.unpin_page(old_id, true);
            self.bpm.unpin_page(new_id, true);
            self.bpm.unpin_page(root_id, true);
            debug!(index = %self.index_name, root = %root_id, "grew new root");
            return Ok(());
        }

        let parent_frame = self.bpm.fetch_page(parent_id)?;
        let has_room = {
            let data = parent_frame.read_data();
            let node = NodeRef::new(&data[..]);
            node.size() < node.max_size()
        };

        if has_room {
            {
                let mut parent_data = parent_frame.write_data();
                let mut parent = InternalPage::<N>::new(&mut parent_data[..]);
                parent.insert_node_after(old_id, &key, new_id);
            }
            self.bpm.unpin_page(old_id, true);
            self.bpm.unpin_page(new_id, true);
            self.bpm.unpin_page(parent_id, true);
            return Ok(());
        }

        // parent is full: split it and recurse
        let (new_parent_id, new_parent_frame) = self.split_internal(&parent_frame)?;
        debug!(index = %self.index_name, node = %parent_id, new_node = %new_parent_id, "split internal node");

        let goes_left = {
            let data = new_parent_frame.read_data();
            let new_parent = InternalPageRef::<N>::new(&data[..]);
            self.comparator
                .compare(key.as_bytes(), new_parent.key_at(1).as_bytes())
                == Ordering::Less
        };
        if goes_left {
            let mut parent_data = parent_frame.write_data();
            let mut parent = InternalPage::<N>::new(&mut parent_data[..]);
            parent.insert_node_after(old_id, &key, new_id);
        } else {
            {
                let mut new_parent_data = new_parent_frame.write_data();
                let mut new_parent = InternalPage::<N>::new(&mut new_parent_data[..]);
                new_parent.insert_node_after(old_id, &key, new_id);
            }
            // the split left `new`'s parent pointer on the old parent
            let mut new_data = new_frame.write_data();
            write_parent_page_id(&mut new_data[..], new_parent_id);
        }

        let promoted = {
            let data = new_parent_frame.read_data();
            InternalPageRef::<N>::new(&data[..]).key_at(0)
        };
        self.bpm.unpin_page(old_id, true);
        self.bpm.unpin_page(new_id, true);
        self.insert_into_parent(parent_id, &parent_frame, promoted, new_parent_id, &new_parent_frame)
    }

    /// Restores minimum occupancy of an underflowed node, borrowing from
    /// or merging with a sibling. Returns whether the node's page was
    /// removed from the tree. Consumes the pin on `node_frame`.
    fn coalesce_or_redistribute(&mut self, node_id: PageId, node_frame: &Arc<Frame>) -> Result<bool> {
        let (is_leaf, size, min_size, max_size, parent_id) = {
            let data = node_frame.read_data();
            let node = NodeRef::new(&data[..]);
            (
                node.is_leaf(),
                node.size(),
                node.min_size(),
                node.max_size(),
                node.parent_page_id(),
            )
        };

        if !parent_id.is_valid() {
            return self.adjust_root(node_id, node_frame);
        }
        if size >= min_size {
            self.bpm.unpin_page(node_id, true);
            return Ok(false);
        }

        let parent_frame = self.bpm.fetch_page(parent_id)?;
        let (index, sibling_id) = {
            let data = parent_frame.read_data();
            let parent = InternalPageRef::<N>::new(&data[..]);
            let index = parent
                .value_index(node_id)
                .expect("underflowed node must be linked in its parent");
            let sibling_id = if index == 0 {
                parent.value_at(1)
            } else {
                parent.value_at(index - 1)
            };
            (index, sibling_id)
        };
        let sibling_frame = self.bpm.fetch_page(sibling_id)?;
        let sibling_size = {
            let data = sibling_frame.read_data();
            NodeRef::new(&data[..]).size()
        };

        if sibling_size + size > max_size {
            // redistribute one entry; the parent separator is rewritten
            // inside the move, and a redistribute cannot underflow the
            // parent, so recursion stops here
            debug!(index = %self.index_name, node = %node_id, sibling = %sibling_id, "redistributing");
            {
                let mut sibling_data = sibling_frame.write_data();
                let mut node_data = node_frame.write_data();
                if is_leaf {
                    let mut sibling = LeafPage::<N>::new(&mut sibling_data[..]);
                    let mut node = LeafPage::<N>::new(&mut node_data[..]);
                    if index == 0 {
                        sibling.move_first_to_end_of(&mut node, self.bpm.as_ref())?;
                    } else {
                        sibling.move_last_to_front_of(&mut node, index, self.bpm.as_ref())?;
                    }
                } else {
                    let mut sibling = InternalPage::<N>::new(&mut sibling_data[..]);
                    let mut node = InternalPage::<N>::new(&mut node_data[..]);
                    if index == 0 {
                        sibling.move_first_to_end_of(&mut node, self.bpm.as_ref())?;
                    } else {
                        sibling.move_last_to_front_of(&mut node, index, self.bpm.as_ref())?;
                    }
                }
            }
            self.bpm.unpin_page(sibling_id, true);
            self.bpm.unpin_page(node_id, true);
            self.bpm.unpin_page(parent_id, true);
            return Ok(false);
        }

        // coalesce: the right-hand node of the pair empties into the
        // left-hand one and its page is deleted
        debug!(index = %self.index_name, node = %node_id, sibling = %sibling_id, "coalescing");
        if index == 0 {
            {
                let mut sibling_data = sibling_frame.write_data();
                let mut node_data = node_frame.write_data();
                if is_leaf {
                    let mut sibling = LeafPage::<N>::new(&mut sibling_data[..]);
                    let mut node = LeafPage::<N>::new(&mut node_data[..]);
                    sibling.move_all_to(&mut node);
                } else {
                    let mut sibling = InternalPage::<N>::new(&mut sibling_data[..]);
                    let mut node = InternalPage::<N>::new(&mut node_data[..]);
                    sibling.move_all_to(&mut node, 1, self.bpm.as_ref())?;
                }
            }
            {
                let mut parent_data = parent_frame.write_data();
                InternalPage::<N>::new(&mut parent_data[..]).remove(1);
            }
            self.bpm.unpin_page(sibling_id, false);
            self.delete_tree_page(sibling_id)?;
            self.bpm.unpin_page(node_id, true);
        } else {
            {
                let mut sibling_data = sibling_frame.write_data();
                let mut node_data = node_frame.write_data();
                if is_leaf {
                    let mut sibling = LeafPage::<N>::new(&mut sibling_data[..]);
                    let mut node = LeafPage::<N>::new(&mut node_data[..]);
                    node.move_all_to(&mut sibling);
                } else {
                    let mut sibling = InternalPage::<N>::new(&mut sibling_data[..]);
                    let mut node = InternalPage::<N>::new(&mut node_data[..]);
                    node.move_all_to(&mut sibling, index, self.bpm.as_ref())?;
                }
            }
            {
                let mut parent_data = parent_frame.write_data();
                InternalPage::<N>::new(&mut parent_data[..]).remove(index);
            }
            self.bpm.unpin_page(node_id, false);
            self.delete_tree_page(node_id)?;
            self.bpm.unpin_page(sibling_id, true);
        }

        self.coalesce_or_redistribute(parent_id, &parent_frame)?;
        Ok(true)
    }

    /// Handles underflow at the root, which is exempt from the minimum
    /// occupancy rule: an empty leaf root empties the tree, and an
    /// internal root left with a single child hands the root role down.
    fn adjust_root(&mut self, root_id: PageId, root_frame: &Arc<Frame>) -> Result<bool> {
        let (is_leaf, size) = {
            let data = root_frame.read_data();
            let node = NodeRef::new(&data[..]);
            (node.is_leaf(), node.size())
        };

        if is_leaf {
            if size == 0 {
                self.bpm.unpin_page(root_id, false);
                self.delete_tree_page(root_id)?;
                self.root_page_id = INVALID_PAGE_ID;
                self.update_root_page_id(false)?;
                debug!(index = %self.index_name, "tree emptied");
                return Ok(true);
            }
            self.bpm.unpin_page(root_id, true);
            return Ok(false);
        }

        if size == 1 {
            let child_id = {
                let mut data = root_frame.write_data();
                let mut root = InternalPage::<N>::new(&mut data[..]);
                root.remove_and_return_only_child()
            };
            self.root_page_id = child_id;
            self.update_root_page_id(false)?;

            let child_frame = self.bpm.fetch_page(child_id)?;
            {
                let mut child_data = child_frame.write_data();
                write_parent_page_id(&mut child_data[..], INVALID_PAGE_ID);
            }
            self.bpm.unpin_page(child_id, true);
            self.bpm.unpin_page(root_id, false);
            self.delete_tree_page(root_id)?;
            debug!(index = %self.index_name, root = %child_id, "collapsed root");
            return Ok(true);
        }

        self.bpm.unpin_page(root_id, true);
        Ok(false)
    }

    /// Deletes a page that has just been unlinked from the tree. The
    /// pool refusing the delete means something still pins a dead page,
    /// which the tree cannot recover from.
    fn delete_tree_page(&self, page_id: PageId) -> Result<()> {
        if !self.bpm.delete_page(page_id)? {
            return Err(CairnError::PageStillPinned(page_id));
        }
        Ok(())
    }

    /// Persists the current root page id in the header page under the
    /// index name, creating the record on first use.
    fn update_root_page_id(&self, insert: bool) -> Result<()> {
        let frame = self.bpm.fetch_page(HEADER_PAGE_ID)?;
        let recorded = {
            let mut data = frame.write_data();
            let mut header = HeaderPage::new(&mut data[..]);
            (insert && header.insert_record(&self.index_name, self.root_page_id))
                || header.update_record(&self.index_name, self.root_page_id)
                || header.insert_record(&self.index_name, self.root_page_id)
        };
        self.bpm.unpin_page(HEADER_PAGE_ID, true);
        if !recorded {
            return Err(CairnError::HeaderPageFull);
        }
        Ok(())
    }
}
