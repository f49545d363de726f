//! Status monitor for cairn.
//!
//! Talks to the status port of a backup server: sends request lines,
//! recognises complete answers, decodes per-client [`StatusRecord`]s and
//! renders them as summary or detail text.
//!
//! ```rust,no_run
//! use cairn_status::{Snapshot, StatusClient, StatusRequest, summary};
//!
//! # async fn run() -> Result<(), cairn_status::StatusError> {
//! let client = StatusClient::connect(4972, StatusRequest::All).await?;
//! if let Snapshot::Records(records) = client.snapshot().await? {
//!     println!("{}", summary(&records));
//! }
//! # Ok(())
//! # }
//! ```

mod batch;
mod client;
mod error;
mod record;
mod render;
mod request;
mod throttle;

pub use batch::{batch_is_complete, decode_batch};
pub use client::{LIST_END, POLL_INTERVAL, Snapshot, StatusClient};
pub use error::StatusError;
pub use record::{BackupInfo, Phase, RunState, STATUS_VERSION, StatusRecord};
pub use render::{
    backup_label, detail_lines, format_date, format_size, summary, summary_line, time_left,
    time_taken,
};
pub use request::{Browse, StatusRequest};
pub use throttle::RequestThrottle;
