//! Cairn - the storage-engine nucleus of a disk-oriented database kernel
//!
//! This crate provides a fixed-size page cache backed by a file-based
//! page allocator, with two associative structures layered on it: an
//! in-memory extendible hash table (used by the cache as its page
//! directory) and a disk-resident B+ tree index whose nodes live inside
//! buffer-pool pages.
//!
//! # Architecture
//!
//! The system is a four-layer stack, leaves first:
//!
//! - **Disk layer** (`storage::disk`): page-granular file I/O
//!   - `DiskManager`: reads, writes, allocates and deallocates pages
//!   - `DiskScheduler`: background worker funneling page I/O requests
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: caches pages in frames, mediating all access
//!   - `LruReplacer`: least-recently-used victim selection
//!   - `Frame`: per-slot page bytes and pin/dirty metadata
//!
//! - **Hash** (`hash`): `ExtendibleHashTable`, a directory-doubling
//!   associative container; the buffer pool's page table
//!
//! - **Index** (`index`): `BPlusTree` over buffer-pool pages, with
//!   split/coalesce/redistribute rebalancing and a forward leaf
//!   iterator; the root page id persists in the header page
//!   (`storage::page::HeaderPage`)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cairn::buffer::BufferPoolManager;
//! use cairn::index::{BPlusTree, GenericKey, Int64Comparator};
//! use cairn::storage::disk::DiskManager;
//! use cairn::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let mut index: BPlusTree<Int64Comparator, 8> =
//!     BPlusTree::new("orders_pk", Arc::clone(&bpm), Int64Comparator);
//!
//! let key = GenericKey::from_i64(42);
//! let rid = RecordId::new(PageId::new(7), SlotId::new(0));
//! index.insert(&key, rid, None).unwrap();
//! assert_eq!(index.get_value(&key, None).unwrap(), Some(rid));
//! ```

pub mod buffer;
pub mod common;
pub mod hash;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{CairnError, PageId, RecordId, Result, SlotId, Transaction};
