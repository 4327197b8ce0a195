mod allocator;
mod capacity;
mod error;
mod pool;

pub use allocator::StorageAllocator;
pub use capacity::{REQUIRED_AVAILABLE, check_capacity, check_pool};
pub use error::StorageError;
pub use pool::select_pool;
