#![deny(missing_docs)]
#![doc = "Source artifact fetching for the keg engine: a swappable transport capability plus digest verification with bounded retry."]

mod fetcher;
mod transport;

pub use fetcher::{artifact_file_name, Fetcher, RetryPolicy};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{FileTransport, Transport};
