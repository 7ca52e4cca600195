//! Buffer reuse subsystem.
//!
//! # Data Flow
//! ```text
//! Raw byte source (socket read half)
//!     → pool.rs take(source)
//!         → idle entry? drain leftovers, rebind source
//!         → otherwise allocate a fresh buffered reader
//!     → caller reads through PoolEntry
//!     → pool.rs give(entry) (kept if capacity remains, else dropped)
//! ```

pub mod pool;

pub use pool::{BufferPool, PoolEntry, PoolSource};
