use spin_sdk::http::{Request, Response};

use crate::auth::authenticate;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, no_content};
use crate::handlers::AppContext;
use crate::models::UserId;
use crate::security::policy;
use crate::store::Store;

pub fn follow_user<S: Store>(ctx: &AppContext<S>, req: &Request, target: UserId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    policy::ensure_not_self(caller, target)?;

    ctx.store.follow(target, caller)?;
    tracing::debug!(follower = caller, target, "followed");

    Ok(no_content())
}

pub fn unfollow_user<S: Store>(ctx: &AppContext<S>, req: &Request, target: UserId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    policy::ensure_not_self(caller, target)?;

    ctx.store.unfollow(target, caller)?;
    tracing::debug!(follower = caller, target, "unfollowed");

    Ok(no_content())
}

pub fn get_followers<S: Store>(ctx: &AppContext<S>, req: &Request, user: UserId) -> Result<Response, ApiError> {
    authenticate(ctx, req)?;
    json_response(200, &ctx.store.followers(user)?)
}

pub fn get_following<S: Store>(ctx: &AppContext<S>, req: &Request, user: UserId) -> Result<Response, ApiError> {
    authenticate(ctx, req)?;
    json_response(200, &ctx.store.following(user)?)
}
