//! Development server for quill pages.
//!
//! Serves a source directory, rendering marked elements of HTML pages on
//! every request, and reloads connected browsers when files change.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchEvent};
pub use websocket::{hmr_client_script, HmrHub, HmrMessage};
