mod index;
mod s3;
mod upload;

pub use index::{generate_index, BuildInfo, IndexRequest};
pub use upload::{upload_index, UploadRequest};
