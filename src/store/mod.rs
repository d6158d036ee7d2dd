//! Persistence capabilities.
//!
//! Everything the handlers need from storage is expressed as traits so the
//! same request code runs against spin's SQLite (`sqlite::SqliteStore`) and
//! the in-memory fake (`memory::MemoryStore`). Multi-step mutations in both
//! implementations go through a `with_transaction` helper whose guard commits
//! on success and rolls back on every other exit.

pub mod memory;
pub mod sqlite;

use thiserror::Error;

use crate::models::{NewPost, NewUser, Post, PostId, ProfileUpdate, StoredCredential, User, UserId};

pub use memory::MemoryStore;
pub use sqlite::{Database, SqliteStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("publication already liked by this user")]
    AlreadyLiked,
    #[error("a user cannot follow themselves")]
    SelfFollow,
    #[error("{0} already in use")]
    Duplicate(&'static str),
    #[error("storage failure: {0}")]
    Storage(String),
}

pub trait UserRepository {
    fn create_user(&self, user: &NewUser) -> Result<User, StoreError>;
    /// Case-insensitive substring match on name or nick.
    fn search_users(&self, name_or_nick: &str) -> Result<Vec<User>, StoreError>;
    fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;
    fn credential_by_email(&self, email: &str) -> Result<Option<StoredCredential>, StoreError>;
    fn password_digest(&self, id: UserId) -> Result<Option<String>, StoreError>;
    fn update_user(&self, id: UserId, update: &ProfileUpdate) -> Result<(), StoreError>;
    fn update_password(&self, id: UserId, digest: &str) -> Result<(), StoreError>;
    /// Removes the user together with their publications, follow edges and
    /// likes. Like counters of publications they had liked are decremented in
    /// the same transaction.
    fn delete_user(&self, id: UserId) -> Result<(), StoreError>;
}

pub trait PostRepository {
    fn create_post(&self, author: UserId, post: &NewPost) -> Result<Post, StoreError>;
    fn post_by_id(&self, id: PostId) -> Result<Option<Post>, StoreError>;
    /// The user's own publications plus those of everyone they follow,
    /// newest first.
    fn feed(&self, user: UserId) -> Result<Vec<Post>, StoreError>;
    fn posts_by_author(&self, author: UserId) -> Result<Vec<Post>, StoreError>;
    fn update_post(&self, id: PostId, post: &NewPost) -> Result<(), StoreError>;
    fn delete_post(&self, id: PostId) -> Result<(), StoreError>;
}

/// Follow and like edges. Every mutation is atomic with its side effects.
pub trait SocialGraph {
    /// Idempotent: following twice leaves one edge and is not an error.
    fn follow(&self, target: UserId, follower: UserId) -> Result<(), StoreError>;
    /// Idempotent: removing a missing edge succeeds.
    fn unfollow(&self, target: UserId, follower: UserId) -> Result<(), StoreError>;
    fn followers(&self, user: UserId) -> Result<Vec<User>, StoreError>;
    fn following(&self, user: UserId) -> Result<Vec<User>, StoreError>;
    /// Inserts the edge and bumps the counter, or fails with `AlreadyLiked`
    /// and changes nothing.
    fn like(&self, post: PostId, liker: UserId) -> Result<(), StoreError>;
    /// Deletes the edge and decrements the counter (floored at zero) only
    /// when an edge was actually removed.
    fn unlike(&self, post: PostId, liker: UserId) -> Result<(), StoreError>;
    fn likers(&self, post: PostId) -> Result<Vec<User>, StoreError>;
}

pub trait Store: UserRepository + PostRepository + SocialGraph {
    fn ping(&self) -> Result<(), StoreError>;
    /// Writes a throwaway row inside a transaction that is always rolled
    /// back, proving the store accepts writes without leaving a trace.
    fn probe_write(&self) -> Result<(), StoreError>;
}
