mod buffer_pool_manager;
mod lru_replacer;

pub use buffer_pool_manager::*;
pub use lru_replacer::*;
