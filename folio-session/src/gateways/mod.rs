// Folio File-System Gateway Layer
//
// This module is the narrow seam between the session engine and the
// mutable outside world. It handles:
//
// - Whole-file reads/writes and renames
// - Per-file change watching (one notify watcher per watched file)
// - Bounded change-event channels for backpressure management
// - Error isolation (a failing read or write never crashes the session)
//
// # Usage
//
// ```ignore
// let (fs, mut changes) = RealFileSystem::new(GatewayConfig::default());
// fs.watch(Path::new("/docs/notes.md"))?;
// while let Some(event) = changes.recv().await {
//     // Filter through the self-save tracker before reloading...
// }
// ```
//
// For testing:
// ```ignore
// let (mock, mut changes) = MockFileSystem::new(GatewayConfig::default());
// mock.set_file(Path::new("/docs/notes.md"), "# Notes");
// mock.emit_change(Path::new("/docs/notes.md"));
// ```

mod error;
mod fs;
mod gateway;
mod mock;

// Re-export public API
pub use error::{GatewayError, GatewayResult};
pub use fs::RealFileSystem;
pub use gateway::{FileChangeEvent, FileSystemGateway, GatewayConfig};
pub use mock::MockFileSystem;
