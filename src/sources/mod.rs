//! Watch source abstractions and implementations.

mod memory;
mod watch_source;

pub use memory::MemoryStore;
pub use watch_source::{WatchSource, WatchStream};
