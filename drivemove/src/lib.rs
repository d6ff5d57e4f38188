pub mod config;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod logging;
pub mod mover;
pub mod storage;
pub mod token_provider;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use directory::{DirectoryClient, DirectoryError, DriveDirectory, MoveOperation};
pub use error::{Diagnostic, MoveError};
pub use mover::{FolderMover, MoveMode, MoveOptions, MoveOutcome, MoveStatus, move_folder};
