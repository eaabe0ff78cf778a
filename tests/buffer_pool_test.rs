//! Integration tests for the buffer pool manager

use std::sync::Arc;

use cairn::buffer::BufferPoolManager;
use cairn::common::{CairnError, PageId};
use cairn::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, dm);
    (bpm, temp_file)
}

#[test]
fn test_buffer_pool_basic_read_write() {
    let (bpm, _temp) = create_bpm(10);

    // Page 0 is the header page, so the first data page is 1
    let (page_id, frame) = bpm.new_page().unwrap();
    assert_eq!(page_id, PageId::new(1));

    {
        let mut data = frame.write_data();
        data[0] = 0xDE;
        data[1] = 0xAD;
        data[2] = 0xBE;
        data[3] = 0xEF;
    }
    bpm.unpin_page(page_id, true);

    let frame = bpm.fetch_page(page_id).unwrap();
    {
        let data = frame.read_data();
        assert_eq!(&data[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }
    bpm.unpin_page(page_id, false);
}

#[test]
fn test_buffer_pool_victim_reuse() {
    // Pool of two frames: the third new_page evicts the only unpinned
    // page, and refetching it reads the last-written bytes from disk
    // (zeros, since it was never dirtied).
    let (bpm, _temp) = create_bpm(2);

    let (p1, _f1) = bpm.new_page().unwrap();
    assert!(bpm.unpin_page(p1, false));

    let (p2, _f2) = bpm.new_page().unwrap();
    let (p3, _f3) = bpm.new_page().unwrap();
    assert_eq!(bpm.pin_count(p1), None);

    // Release the survivors so p1 can come back in
    bpm.unpin_page(p2, false);
    bpm.unpin_page(p3, false);

    let frame = bpm.fetch_page(p1).unwrap();
    assert!(frame.read_data().iter().all(|&b| b == 0));
    bpm.unpin_page(p1, false);
}

#[test]
fn test_buffer_pool_all_pinned_fails() {
    let (bpm, _temp) = create_bpm(2);

    let (_p1, _f1) = bpm.new_page().unwrap();
    let (_p2, _f2) = bpm.new_page().unwrap();

    assert!(matches!(bpm.new_page(), Err(CairnError::BufferPoolFull)));
}

#[test]
fn test_buffer_pool_pin_accounting() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, _frame) = bpm.new_page().unwrap();
    assert_eq!(bpm.pin_count(page_id), Some(1));

    let _again = bpm.fetch_page(page_id).unwrap();
    assert_eq!(bpm.pin_count(page_id), Some(2));

    assert!(bpm.unpin_page(page_id, false));
    assert!(bpm.unpin_page(page_id, false));
    assert_eq!(bpm.pin_count(page_id), Some(0));

    // Unpinning past zero is rejected
    assert!(!bpm.unpin_page(page_id, false));
}

#[test]
fn test_buffer_pool_dirty_flag_is_sticky() {
    let (bpm, _temp) = create_bpm(2);

    let (page_id, frame) = bpm.new_page().unwrap();
    {
        frame.write_data()[0] = 7;
    }
    // Dirty unpin followed by a clean unpin of a refetch must not lose
    // the dirty bit
    bpm.unpin_page(page_id, true);
    let _frame = bpm.fetch_page(page_id).unwrap();
    bpm.unpin_page(page_id, false);
    assert_eq!(bpm.is_dirty(page_id), Some(true));

    // Eviction writes the page back
    let (p2, _) = bpm.new_page().unwrap();
    bpm.unpin_page(p2, false);
    let (p3, _) = bpm.new_page().unwrap();
    bpm.unpin_page(p3, false);

    let frame = bpm.fetch_page(page_id).unwrap();
    assert_eq!(frame.read_data()[0], 7);
    bpm.unpin_page(page_id, false);
}

#[test]
fn test_buffer_pool_flush_persists() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_id;
    let payload = b"flush survives reopen";
    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, dm);

        let (pid, frame) = bpm.new_page().unwrap();
        page_id = pid;
        {
            frame.write_data()[..payload.len()].copy_from_slice(payload);
        }
        bpm.unpin_page(page_id, true);
        assert!(bpm.flush_page(page_id).unwrap());
    }

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, dm);

        let frame = bpm.fetch_page(page_id).unwrap();
        assert_eq!(&frame.read_data()[..payload.len()], payload);
        bpm.unpin_page(page_id, false);
    }
}

#[test]
fn test_buffer_pool_delete_page() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, _frame) = bpm.new_page().unwrap();

    // Refused while pinned
    assert!(!bpm.delete_page(page_id).unwrap());

    bpm.unpin_page(page_id, false);
    assert!(bpm.delete_page(page_id).unwrap());
    assert_eq!(bpm.pin_count(page_id), None);
    assert_eq!(bpm.free_frame_count(), 10);

    // The deallocated id comes back from the allocator
    let (reused, _frame) = bpm.new_page().unwrap();
    assert_eq!(reused, page_id);
    bpm.unpin_page(reused, false);
}

#[test]
fn test_buffer_pool_unpin_flush_unknown_page() {
    let (bpm, _temp) = create_bpm(4);
    assert!(!bpm.unpin_page(PageId::new(33), true));
    assert!(!bpm.flush_page(PageId::new(33)).unwrap());
}

#[test]
fn test_buffer_pool_concurrent_mixed_workload() {
    use std::thread;

    let (bpm, _temp) = create_bpm(8);
    let bpm = Arc::new(bpm);

    // Seed some shared pages
    let mut shared = Vec::new();
    for _ in 0..4 {
        let (pid, _) = bpm.new_page().unwrap();
        bpm.unpin_page(pid, false);
        shared.push(pid);
    }

    let mut handles = Vec::new();
    for t in 0..4usize {
        let pool = Arc::clone(&bpm);
        let pages = shared.clone();
        handles.push(thread::spawn(move || {
            for i in 0..100usize {
                let pid = pages[(t + i) % pages.len()];
                let frame = pool.fetch_page(pid).unwrap();
                {
                    frame.write_data()[t] = i as u8;
                }
                pool.unpin_page(pid, true);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    for pid in shared {
        assert_eq!(bpm.pin_count(pid), Some(0));
    }
}
