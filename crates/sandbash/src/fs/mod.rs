//! Virtual filesystem layer
//!
//! The interpreter never touches the host filesystem; everything goes
//! through the [`FileSystem`] trait. [`MemFs`] is the default in-memory
//! implementation.

mod memory;
mod traits;

pub use memory::MemFs;
pub use traits::{DirEntry, FileSystem, FileType, Metadata, RmOptions, WriteOptions};
