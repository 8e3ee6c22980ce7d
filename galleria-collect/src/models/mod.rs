//! Domain models for the collection service

pub mod artwork;
pub mod collection_log;
pub mod followed_user;

pub use artwork::{Artwork, ArtworkKind};
pub use collection_log::{CollectionLog, LogStatus, LogType};
pub use followed_user::FollowedUser;
