mod b_plus_tree;
mod index_iterator;
mod internal_page;
mod key;
mod leaf_page;
mod node;

pub use b_plus_tree::BPlusTree;
pub use index_iterator::IndexIterator;
pub use internal_page::{InternalPage, InternalPageRef};
pub use key::{BytewiseComparator, GenericKey, Int64Comparator, KeyComparator};
pub use leaf_page::{LeafPage, LeafPageRef};
pub use node::{NodeRef, PageType};
