//! Remote table backends.

pub mod http_remote;
pub mod memory_remote;

pub use http_remote::HttpRemoteStore;
pub use memory_remote::MemoryRemoteStore;
