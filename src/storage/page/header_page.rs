use crate::common::{PageId, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;

/// Maximum number of index records a header page can hold.
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Mutable view of the header page (page 0).
///
/// The header page persists one record per index: a NUL-padded 32-byte
/// index name followed by the 4-byte LE root page id. Indexes update
/// their record every time the root page changes.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn num_records(&self) -> usize {
        read_count(self.data)
    }

    /// Adds a record for a new index. Fails when the name is already
    /// present or the page is out of record slots. Names longer than the
    /// record's name field are rejected.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        if name.len() > NAME_SIZE || find_record(self.data, name).is_some() {
            return false;
        }
        let count = read_count(self.data);
        if count >= MAX_HEADER_RECORDS {
            return false;
        }

        let offset = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data[offset..offset + NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root_page_id.as_i32().to_le_bytes());

        write_count(self.data, count + 1);
        true
    }

    /// Rewrites the root page id of an existing record.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        match find_record(self.data, name) {
            Some(index) => {
                let offset = RECORDS_OFFSET + index * RECORD_SIZE;
                self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
                    .copy_from_slice(&root_page_id.as_i32().to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Removes a record, compacting the remaining ones.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let Some(index) = find_record(self.data, name) else {
            return false;
        };
        let count = read_count(self.data);
        let start = RECORDS_OFFSET + index * RECORD_SIZE;
        let end = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data.copy_within(start + RECORD_SIZE..end, start);
        write_count(self.data, count - 1);
        true
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        read_root_id(self.data, name)
    }
}

/// Read-only view of the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn num_records(&self) -> usize {
        read_count(self.data)
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        read_root_id(self.data, name)
    }
}

fn read_count(data: &[u8]) -> usize {
    let bytes: [u8; 4] = data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
        .try_into()
        .unwrap();
    u32::from_le_bytes(bytes) as usize
}

fn write_count(data: &mut [u8], count: usize) {
    data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
        .copy_from_slice(&(count as u32).to_le_bytes());
}

fn find_record(data: &[u8], name: &str) -> Option<usize> {
    let name_bytes = name.as_bytes();
    if name_bytes.len() > NAME_SIZE {
        return None;
    }
    (0..read_count(data)).find(|&i| {
        let offset = RECORDS_OFFSET + i * RECORD_SIZE;
        let stored = &data[offset..offset + NAME_SIZE];
        stored.len() >= name_bytes.len()
            && &stored[..name_bytes.len()] == name_bytes
            && stored[name_bytes.len()..].iter().all(|&b| b == 0)
    })
}

fn read_root_id(data: &[u8], name: &str) -> Option<PageId> {
    find_record(data, name).map(|index| {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
        PageId::new(i32::from_le_bytes(bytes))
    })
}
