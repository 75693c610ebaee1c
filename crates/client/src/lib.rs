// strata-client: client-side replica of a server-owned layer tree.

pub mod api;
pub mod cache;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod live;
pub mod navigator;
mod ops;
pub mod pager;
pub mod reconcile;
pub mod replica;
pub mod session;
pub mod sync;

pub use api::{HttpTreeApi, TreeApi};
#[cfg(any(test, feature = "test-util"))]
pub use api::MemoryTreeApi;
pub use clipboard::{ClipOperation, Clipboard, ClipboardEntry};
pub use config::ClientConfig;
pub use error::{ClientError, ErrorKind};
pub use live::{ConnectionState, LiveChannel, LiveTransport, ReconnectPolicy, WsTransport};
pub use reconcile::{Notice, NoticeLevel};
pub use replica::{Replica, Selection};
pub use session::{Session, SessionHandle};
