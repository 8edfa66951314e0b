mod download;
mod filter;
mod pin;

pub use download::{download_dependencies, DownloadRequest, DEFAULT_MAX_VERSIONS};
pub use filter::{filter_system_packages, FilterRequest};
pub use pin::{pin_dependencies, PinRequest};
