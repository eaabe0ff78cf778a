use std::sync::Arc;

use crate::buffer::{BufferPoolManager, Frame};
use crate::common::{CairnError, PageId, RecordId, Result, INVALID_PAGE_ID};

use super::key::GenericKey;
use super::leaf_page::LeafPageRef;

/// Forward iterator over the leaf chain of a B+ tree.
///
/// Holds the current leaf pinned; the pin moves along as the iterator
/// crosses leaf boundaries and is released when the iterator is dropped.
pub struct IndexIterator<const N: usize> {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    frame: Option<Arc<Frame>>,
    index: usize,
    is_end: bool,
}

impl<const N: usize> IndexIterator<N> {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        page_id: PageId,
        frame: Arc<Frame>,
        index: usize,
    ) -> Self {
        Self {
            bpm,
            page_id,
            frame: Some(frame),
            index,
            is_end: false,
        }
    }

    /// An iterator that is already exhausted (e.g. over an empty tree).
    pub(crate) fn at_end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            page_id: INVALID_PAGE_ID,
            frame: None,
            index: 0,
            is_end: true,
        }
    }

    pub fn is_end(&self) -> bool {
        self.is_end
    }

    /// The entry under the cursor. Fails when the iterator is exhausted.
    pub fn current(&self) -> Result<(GenericKey<N>, RecordId)> {
        if self.is_end {
            return Err(CairnError::IteratorOutOfRange);
        }
        let frame = self.frame.as_ref().ok_or(CairnError::IteratorOutOfRange)?;
        let data = frame.read_data();
        let leaf = LeafPageRef::<N>::new(&data[..]);
        if self.index >= leaf.size() as usize {
            return Err(CairnError::IteratorOutOfRange);
        }
        Ok(leaf.item(self.index))
    }

    /// Steps to the next entry, following the sibling pointer when the
    /// current leaf is exhausted. Stepping an exhausted iterator is a
    /// no-op.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_end {
            return Ok(());
        }
        let frame = self.frame.as_ref().ok_or(CairnError::IteratorOutOfRange)?;
        let (size, next_page_id) = {
            let data = frame.read_data();
            let leaf = LeafPageRef::<N>::new(&data[..]);
            (leaf.size() as usize, leaf.next_page_id())
        };

        if self.index + 1 < size {
            self.index += 1;
            return Ok(());
        }
        if !next_page_id.is_valid() {
            self.is_end = true;
            return Ok(());
        }

        let next_frame = self.bpm.fetch_page(next_page_id)?;
        self.bpm.unpin_page(self.page_id, false);
        self.frame = Some(next_frame);
        self.page_id = next_page_id;
        self.index = 0;
        Ok(())
    }

    /// Yields the entry under the cursor and steps past it.
    pub fn next_entry(&mut self) -> Result<Option<(GenericKey<N>, RecordId)>> {
        if self.is_end {
            return Ok(None);
        }
        let item = self.current()?;
        self.advance()?;
        Ok(Some(item))
    }
}

impl<const N: usize> Iterator for IndexIterator<N> {
    type Item = Result<(GenericKey<N>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<const N: usize> Drop for IndexIterator<N> {
    fn drop(&mut self) {
        if self.frame.take().is_some() {
            self.bpm.unpin_page(self.page_id, false);
        }
    }
}
