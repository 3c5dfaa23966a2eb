//! Live reload system.
//!
//! ```text
//! notify ──► FileWatcher ──ChangeEvent──► filter + debouncer ──ReloadSignal──►
//!     PushDispatcher ──► SessionRegistry ──► one WebSocket task per page
//! ```

mod debouncer;
mod dispatcher;
mod event;
mod manager;
mod protocol;
mod registry;
mod watcher;
mod websocket;

pub use event::WatchConfig;
pub(crate) use manager::LiveReloadManager;
pub use manager::LiveReloadOptions;
pub(crate) use watcher::check_root;
pub(crate) use websocket::ws_handler;
