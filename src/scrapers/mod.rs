//! Page access: the browser session and the rendered-table snapshot reader.

pub mod browser;
pub mod snapshot;

pub use browser::{BrowserEngineConfig, BrowserSession, CdpLauncher, SessionError, SessionLauncher};
pub use snapshot::{table_rows, RowLayout, SnapshotError};
