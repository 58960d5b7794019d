//! Action handlers that need infrastructure: HTTP and SQLite storage.
//!
//! Both implement `flowline_core::workflow::action::ActionHandler` and are
//! registered on the dispatcher by the binary.

pub mod http;
pub mod storage;

pub use http::HttpActionHandler;
pub use storage::SqliteStorageHandler;
