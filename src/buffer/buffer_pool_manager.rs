use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::common::{
    CairnError, FrameId, PageId, Result, BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::hash::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::LruReplacer;

/// Page bytes for one buffer slot.
///
/// Handles returned by `fetch_page`/`new_page` expose only the page
/// contents. Everything else about a frame - which page is resident,
/// the pin count, the dirty flag - is bookkeeping owned by the pool
/// and lives in its `FrameMeta` table, never in the handle.
pub struct Frame {
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Returns a read guard to the page data.
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Returns a write guard to the page data.
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }
}

/// Per-frame bookkeeping. Plain fields: only ever read or written with
/// the pool lock held, so no per-field synchronization is needed.
struct FrameMeta {
    /// The page resident in this frame (INVALID_PAGE_ID if unassigned)
    page_id: PageId,
    /// Handles not yet returned through unpin_page
    pin_count: u32,
    /// Whether the resident page was modified since it was read
    is_dirty: bool,
}

impl FrameMeta {
    fn new() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }

    fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}

/// Mutable pool state behind the pool-wide mutex.
struct PoolState {
    metas: Vec<FrameMeta>,
    free_list: VecDeque<FrameId>,
}

/// BufferPoolManager mediates all page access: it caches disk pages in a
/// fixed array of frames, tracks residency through an extendible-hash
/// page table, and evicts unpinned pages in LRU order when a frame is
/// needed.
///
/// A single pool-wide mutex guards the frame metadata and free list and
/// is held for the entirety of every public operation, including the
/// disk I/O performed inside it. The page table and replacer carry
/// their own internal locks but are only reached while the pool lock is
/// held (lock order: pool, then replacer or page table - never
/// reversed).
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Frame metadata and free list, behind the pool-wide latch
    state: Mutex<PoolState>,
    /// The page buffers, one per frame
    frames: Vec<Arc<Frame>>,
    /// Page table: maps resident page IDs to frame IDs
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Eviction order over mapped-but-unpinned frames
    replacer: LruReplacer<FrameId>,
    /// Disk I/O worker
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut metas = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            frames.push(Arc::new(Frame::new()));
            metas.push(FrameMeta::new());
            free_list.push_back(FrameId::new(i as u32));
        }

        Self {
            pool_size,
            state: Mutex::new(PoolState { metas, free_list }),
            frames,
            page_table: ExtendibleHashTable::new(BUCKET_SIZE),
            replacer: LruReplacer::new(),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Fetches a page into the pool, pinning its frame.
    ///
    /// A resident page just gets its pin count bumped (and leaves the
    /// replacer if it was evictable). Otherwise a frame is taken from the
    /// free list, or failing that by evicting the LRU victim, and the
    /// page is read from disk. Every successful fetch must be balanced by
    /// exactly one `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        if !page_id.is_valid() {
            return Err(CairnError::InvalidPageId(page_id));
        }
        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            state.metas[frame_id.as_usize()].pin_count += 1;
            self.replacer.erase(&frame_id);
            return Ok(Arc::clone(&self.frames[frame_id.as_usize()]));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.as_usize()];

        let mut buf = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut buf)?;
        frame.write_data().copy_from_slice(&buf);

        let meta = &mut state.metas[frame_id.as_usize()];
        meta.page_id = page_id;
        meta.is_dirty = false;
        meta.pin_count = 1;

        self.page_table.insert(page_id, frame_id);
        Ok(Arc::clone(frame))
    }

    /// Drops one pin on a page, ORing in the caller's dirty flag. On the
    /// last unpin the frame becomes evictable. Returns false when the
    /// page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let meta = &mut state.metas[frame_id.as_usize()];
        if meta.pin_count == 0 {
            return false;
        }

        // once dirty, stays dirty until write-back
        meta.is_dirty |= is_dirty;
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            self.replacer.insert(frame_id);
        }
        true
    }

    /// Writes a resident page's bytes to disk. The dirty flag is left
    /// untouched; eviction is the point where it resets.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(CairnError::InvalidPageId(page_id));
        }
        let _state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };

        let mut buf = [0u8; PAGE_SIZE];
        buf.copy_from_slice(&self.frames[frame_id.as_usize()].read_data()[..]);
        self.disk_scheduler.schedule_write_sync(page_id, &buf)?;
        Ok(true)
    }

    /// Writes every dirty resident page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();

        for (slot, meta) in state.metas.iter().enumerate() {
            if meta.page_id.is_valid() && meta.is_dirty {
                let mut buf = [0u8; PAGE_SIZE];
                buf.copy_from_slice(&self.frames[slot].read_data()[..]);
                self.disk_scheduler.schedule_write_sync(meta.page_id, &buf)?;
            }
        }
        Ok(())
    }

    /// Allocates a fresh page on disk and pins it into a zeroed frame.
    /// Returns the new page id together with its frame.
    pub fn new_page(&self) -> Result<(PageId, Arc<Frame>)> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.as_usize()];

        let page_id = self.disk_scheduler.disk_manager().allocate_page()?;

        frame.write_data().fill(0);
        let meta = &mut state.metas[frame_id.as_usize()];
        meta.page_id = page_id;
        meta.is_dirty = false;
        meta.pin_count = 1;

        self.page_table.insert(page_id, frame_id);
        Ok((page_id, Arc::clone(frame)))
    }

    /// Deletes a page. A resident page must be unpinned; its frame is
    /// unmapped, reset, and returned to the free list. The disk-side id
    /// is deallocated whether or not the page was resident. Returns false
    /// only when the page is resident and still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(CairnError::InvalidPageId(page_id));
        }
        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let slot = frame_id.as_usize();
            if state.metas[slot].pin_count != 0 {
                return Ok(false);
            }
            self.page_table.remove(&page_id);
            self.replacer.erase(&frame_id);
            state.metas[slot].reset();
            self.frames[slot].write_data().fill(0);
            state.free_list.push_back(frame_id);
        }

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        Ok(true)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Pin count of a resident page, or None if the page is not cached.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| state.metas[frame_id.as_usize()].pin_count)
    }

    /// Dirty flag of a resident page, or None if the page is not cached.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| state.metas[frame_id.as_usize()].is_dirty)
    }

    /// Obtains an unassigned frame: the free list head when available,
    /// otherwise the replacer's victim. A dirty victim is written back
    /// and its old mapping removed before the frame is handed out reset.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(CairnError::BufferPoolFull)?;
        let slot = frame_id.as_usize();
        let old_page_id = state.metas[slot].page_id;

        if state.metas[slot].is_dirty {
            debug!(page_id = %old_page_id, "writing back dirty victim");
            let mut buf = [0u8; PAGE_SIZE];
            buf.copy_from_slice(&self.frames[slot].read_data()[..]);
            self.disk_scheduler.schedule_write_sync(old_page_id, &buf)?;
        }
        if old_page_id.is_valid() {
            self.page_table.remove(&old_page_id);
        }
        state.metas[slot].reset();
        self.frames[slot].write_data().fill(0);
        Ok(frame_id)
    }
}
