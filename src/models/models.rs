use serde::{Serialize, Deserialize};

pub type UserId = u64;
pub type PostId = u64;

/// Public view of a registered user. The password digest is kept out of this
/// type so it can never be serialised into a response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub nick: String,
    pub email: String,
    pub created_at: String,
}

/// Registration and profile-update payload.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct UserInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub pass: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub pass: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PasswordChange {
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub new: String,
}

/// Row returned by the login lookup.
#[derive(Clone, Debug)]
pub struct StoredCredential {
    pub id: UserId,
    pub digest: String,
}

/// Validated user fields ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub nick: String,
    pub email: String,
    pub digest: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileUpdate {
    pub name: String,
    pub nick: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    pub author_nick: String,
    pub likes: u64,
    pub created_at: String,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct PostInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
}
