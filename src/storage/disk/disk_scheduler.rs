use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{CairnError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// A single disk I/O request. Requests own their page buffer; for reads
/// the worker fills it, for writes the worker drains it. The completion
/// channel hands the buffer back along with the outcome.
struct DiskRequest {
    is_write: bool,
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    completion: mpsc::Sender<(bool, Box<[u8; PAGE_SIZE]>)>,
}

/// DiskScheduler funnels page I/O through a background worker thread fed
/// by a bounded request queue. Callers that need the result immediately
/// use the `_sync` variants, which block on the request's completion
/// channel.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let shutdown_flag = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || {
            Self::worker_loop(dm, receiver, shutdown_flag);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Reads a page and blocks until the worker has filled the buffer.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        let request = DiskRequest {
            is_write: false,
            page_id,
            data: Box::new([0u8; PAGE_SIZE]),
            completion: tx,
        };
        self.submit(request)?;

        let (ok, buffer) = rx
            .recv()
            .map_err(|e| CairnError::DiskScheduler(format!("completion lost: {}", e)))?;
        if !ok {
            return Err(CairnError::DiskScheduler(format!(
                "read of {} failed",
                page_id
            )));
        }
        data.copy_from_slice(&buffer[..]);
        Ok(())
    }

    /// Writes a page and blocks until the worker has committed it.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buffer = Box::new([0u8; PAGE_SIZE]);
        buffer.copy_from_slice(data);

        let (tx, rx) = mpsc::channel();
        let request = DiskRequest {
            is_write: true,
            page_id,
            data: buffer,
            completion: tx,
        };
        self.submit(request)?;

        let (ok, _) = rx
            .recv()
            .map_err(|e| CairnError::DiskScheduler(format!("completion lost: {}", e)))?;
        if !ok {
            return Err(CairnError::DiskScheduler(format!(
                "write of {} failed",
                page_id
            )));
        }
        Ok(())
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn submit(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| CairnError::DiskScheduler(format!("failed to queue request: {}", e)))
    }

    fn worker_loop(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, mut request: DiskRequest) {
        let ok = if request.is_write {
            disk_manager
                .write_page(request.page_id, &request.data[..])
                .is_ok()
        } else {
            disk_manager
                .read_page(request.page_id, &mut request.data[..])
                .is_ok()
        };
        let _ = request.completion.send((ok, request.data));
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.schedule_write_sync(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler
            .schedule_read_sync(page_id, &mut read_data)
            .unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_interleaved_requests() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let p1 = scheduler.disk_manager().allocate_page().unwrap();
        let p2 = scheduler.disk_manager().allocate_page().unwrap();

        scheduler.schedule_write_sync(p1, &[1u8; PAGE_SIZE]).unwrap();
        scheduler.schedule_write_sync(p2, &[2u8; PAGE_SIZE]).unwrap();

        let mut read1 = [0u8; PAGE_SIZE];
        let mut read2 = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(p1, &mut read1).unwrap();
        scheduler.schedule_read_sync(p2, &mut read2).unwrap();

        assert_eq!(read1[0], 1);
        assert_eq!(read2[0], 2);
    }
}
