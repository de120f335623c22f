//! Resumable package transfers.
//!
//! - `engine`: the transfer job, its events and the thread handle
//! - `transport`: the HTTP seam (`HttpTransport`) and its reqwest implementation
//! - `speed`: moving-average speed and ETA
//! - `links`: `rel=duplicate` mirror parsing for redirect fallback

mod engine;
mod error;
mod links;
mod speed;
mod transport;

pub use engine::{
    spawn_transfer, JobId, TransferEvent, TransferHandle, TransferJob, TransferProgress,
    TransferReporter, TransferRequest,
};
pub use error::TransferError;
pub use links::{duplicate_links, parse_duplicate_link, DuplicateLink, DEFAULT_PRIORITY};
pub use speed::{SpeedEstimator, SAMPLE_INTERVAL};
pub use transport::{content_length, HttpResponse, HttpTransport, ReqwestTransport, CONNECT_TIMEOUT};
