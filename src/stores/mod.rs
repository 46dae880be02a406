pub mod fs;
pub mod memory;
pub mod state;
pub mod traits;

pub use fs::FsArchiveStore;
pub use memory::MemoryArchiveStore;
pub use state::{PersistedState, StateStore};
pub use traits::{ArchiveStore, DirEntry, HistoryStore, SessionStore};
