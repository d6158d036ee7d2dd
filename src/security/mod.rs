pub mod credentials;
pub mod policy;
pub mod tokens;

pub use credentials::CredentialError;
pub use policy::Denied;
pub use tokens::{TokenError, TokenService};
