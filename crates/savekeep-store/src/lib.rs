// ABOUTME: Persistence layer for savekeep, handling slot files on disk.
// ABOUTME: Provides atomic slot writes with backup fallback, save directory resolution, and slot queries.

pub mod atomic;
pub mod directory;
pub mod registry;

pub use atomic::{AtomicFileStore, RepairReport, SlotPaths, StoreError};
pub use directory::{DirectoryError, SaveDirectory};
pub use registry::{SlotHealth, SlotRegistry, SlotReport};
