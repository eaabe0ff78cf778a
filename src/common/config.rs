/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// Page ID of the header page, which persists index-name -> root-page-id
/// records. Always the first page of the database file.
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Slot capacity of an extendible-hash bucket when used as the buffer
/// pool's page table
pub const BUCKET_SIZE: usize = 50;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

use super::types::PageId;
