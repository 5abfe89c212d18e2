//! Client-side file operations built on the two store interfaces

pub mod delete_file;
pub mod download_file;
pub mod upload_file;

pub use delete_file::{DeleteFileOperation, DeleteFileOperationRequest, DeleteFileOperationResult};
pub use download_file::{
    DownloadFileOperation, DownloadFileOperationRequest, DownloadFileOperationResult,
};
pub use upload_file::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_UPLOAD_CONCURRENCY, UploadFileOperation,
    UploadFileOperationRequest, UploadFileOperationResult,
};
