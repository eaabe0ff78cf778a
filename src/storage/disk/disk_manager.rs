use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages of a single database
/// file and hands out page ids. Page 0 is reserved for the header page
/// and is written out when the file is first created; deallocated ids are
/// recycled before the file is extended.
pub struct DiskManager {
    db_file: Mutex<File>,
    db_path: PathBuf,
    /// Next page id to hand out when the free list is empty
    next_page_id: AtomicI32,
    /// Page ids returned by deallocate_page, available for reuse
    free_pages: Mutex<Vec<PageId>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at the given path. A fresh
    /// file gets its header page zeroed out on disk immediately.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let pages_in_file = (file_size / PAGE_SIZE as u64) as i32;

        let dm = Self {
            db_file: Mutex::new(file),
            db_path,
            next_page_id: AtomicI32::new(pages_in_file.max(1)),
            free_pages: Mutex::new(Vec::new()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if pages_in_file == 0 {
            let zeros = [0u8; PAGE_SIZE];
            dm.write_page(HEADER_PAGE_ID, &zeros)?;
        }

        Ok(dm)
    }

    /// Reads a page from disk into the provided buffer.
    /// Reading past the end of the file yields zeros.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;

        let mut total = 0;
        while total < PAGE_SIZE {
            let read = file.read(&mut data[total..])?;
            if read == 0 {
                break;
            }
            total += read;
        }
        if total < PAGE_SIZE {
            data[total..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a fresh page id, reusing a deallocated one when
    /// possible. New pages are zeroed on disk so a read-before-write sees
    /// defined contents. Never returns the header page id.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = match self.free_pages.lock().pop() {
            Some(recycled) => recycled,
            None => PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst)),
        };

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;

        Ok(page_id)
    }

    /// Marks a page id as free; the id may be handed out again later.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if page_id.is_valid() && page_id != HEADER_PAGE_ID {
            self.free_pages.lock().push(page_id);
        }
        Ok(())
    }

    /// Number of pages the file has grown to (free-listed ids included).
    pub fn num_pages(&self) -> i32 {
        self.next_page_id.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.db_file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.db_file.get_mut().sync_all();
    }
}
