//! Ownership rules applied after the caller's identity has been validated.

use thiserror::Error;

use crate::models::UserId;
use crate::security::credentials;

/// Why a request was refused. The HTTP layer collapses both variants into a
/// response that does not say which rule fired.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    #[error("caller may not act on this resource")]
    Forbidden,
    #[error("current password did not verify")]
    BadCredentials,
}

/// Profiles and publications may only be changed by their owner.
pub fn ensure_owner(caller: UserId, owner: UserId) -> Result<(), Denied> {
    if caller == owner {
        Ok(())
    } else {
        Err(Denied::Forbidden)
    }
}

/// Follow and unfollow must name someone else.
pub fn ensure_not_self(caller: UserId, target: UserId) -> Result<(), Denied> {
    if caller == target {
        Err(Denied::Forbidden)
    } else {
        Ok(())
    }
}

pub fn ensure_password_change(
    caller: UserId,
    owner: UserId,
    stored_digest: &str,
    current: &str,
) -> Result<(), Denied> {
    ensure_owner(caller, owner)?;
    if credentials::verify(stored_digest, current) {
        Ok(())
    } else {
        Err(Denied::BadCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_rule() {
        assert_eq!(ensure_owner(1, 1), Ok(()));
        assert_eq!(ensure_owner(1, 2), Err(Denied::Forbidden));
    }

    #[test]
    fn self_follow_rule() {
        assert_eq!(ensure_not_self(1, 2), Ok(()));
        assert_eq!(ensure_not_self(3, 3), Err(Denied::Forbidden));
    }

    #[test]
    fn password_change_needs_ownership_and_current_password() {
        let digest = credentials::hash("old-pass").unwrap();

        assert_eq!(ensure_password_change(1, 1, &digest, "old-pass"), Ok(()));
        assert_eq!(
            ensure_password_change(1, 1, &digest, "wrong"),
            Err(Denied::BadCredentials)
        );
        // Ownership is checked before the (expensive) verification.
        assert_eq!(
            ensure_password_change(2, 1, &digest, "old-pass"),
            Err(Denied::Forbidden)
        );
    }
}
