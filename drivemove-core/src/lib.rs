mod batch;
mod client;
mod oauth;

pub use batch::{BatchChunkResult, BatchRequest, BatchResponse, MAX_BATCH_REQUESTS};
pub use client::{
    ApiErrorClass, DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE, FileList, children_query,
};
pub use oauth::{OAuthClient, OAuthError, OAuthToken};
