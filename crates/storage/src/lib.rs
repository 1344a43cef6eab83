//! Artifact publishing to Azure-compatible blob storage.
//!
//! The publisher is deliberately advisory: `publish` always returns an
//! [`UploadOutcome`] and never an error, so a storage fault can only ever
//! degrade a response, not fail it. The blob REST protocol (SharedKey
//! signing, container ensure, block blob upload) is implemented directly
//! over reqwest.

mod auth;
pub mod connection;
pub mod publisher;

pub use connection::{ConnectionString, ConnectionStringError};
pub use publisher::{
    from_config, BlobPublisher, Publisher, UnconfiguredPublisher, UploadOutcome,
};
