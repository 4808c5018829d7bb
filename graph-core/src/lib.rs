mod auth;
mod client;

pub use auth::{AccessToken, AuthClient, AuthError};
pub use client::{
    ApiErrorClass, DriveItem, FileFacet, FolderFacet, GraphClient, GraphError,
};
