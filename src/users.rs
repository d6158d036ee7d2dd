use std::time::Instant;

use spin_sdk::http::{Request, Response};

use crate::auth::authenticate;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{is_valid_email, json_response, no_content, read_json, sanitize_text};
use crate::core::query_params::{get_string, parse_query_params};
use crate::handlers::AppContext;
use crate::metrics::{record_operation, Operation};
use crate::models::{NewUser, PasswordChange, ProfileUpdate, UserId, UserInput};
use crate::security::{credentials, policy};
use crate::store::Store;

fn prepare_profile(input: &UserInput) -> Result<ProfileUpdate, ApiError> {
    let name = sanitize_text(input.name.trim());
    let nick = sanitize_text(input.nick.trim());
    let email = input.email.trim().to_string();

    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    if nick.is_empty() {
        return Err(ApiError::BadRequest("Nick is required".to_string()));
    }
    if email.is_empty() {
        return Err(ApiError::BadRequest("Email is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH || nick.chars().count() > MAX_NICK_LENGTH {
        return Err(ApiError::BadRequest("Name and nick must be at most 50 characters".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH || !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Email is invalid".to_string()));
    }

    Ok(ProfileUpdate { name, nick, email })
}

fn check_new_password(pass: &str) -> Result<(), ApiError> {
    if pass.is_empty() {
        return Err(ApiError::BadRequest("Password is required".to_string()));
    }
    if pass.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest("Password must be at least 3 characters".to_string()));
    }
    Ok(())
}

pub fn create_user<S: Store>(ctx: &AppContext<S>, req: &Request) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = register(ctx, req);
    record_operation(Operation::CreateUser, &result, started);
    result
}

fn register<S: Store>(ctx: &AppContext<S>, req: &Request) -> Result<Response, ApiError> {
    let input: UserInput = read_json(req)?;
    let profile = prepare_profile(&input)?;
    check_new_password(&input.pass)?;

    let user = ctx.store.create_user(&NewUser {
        name: profile.name,
        nick: profile.nick,
        email: profile.email,
        digest: credentials::hash(&input.pass)?,
    })?;

    tracing::info!(user_id = user.id, "user registered");
    json_response(201, &user)
}

pub fn search_users<S: Store>(ctx: &AppContext<S>, req: &Request) -> Result<Response, ApiError> {
    authenticate(ctx, req)?;

    let params = parse_query_params(&req.uri());
    let term = get_string(&params, "user", Some("")).unwrap_or_default();
    let users = ctx.store.search_users(term.trim())?;

    json_response(200, &users)
}

pub fn get_user<S: Store>(ctx: &AppContext<S>, req: &Request, id: UserId) -> Result<Response, ApiError> {
    authenticate(ctx, req)?;

    match ctx.store.user_by_id(id)? {
        Some(user) => json_response(200, &user),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

pub fn update_user<S: Store>(ctx: &AppContext<S>, req: &Request, id: UserId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    policy::ensure_owner(caller, id)?;

    let input: UserInput = read_json(req)?;
    let profile = prepare_profile(&input)?;
    ctx.store.update_user(id, &profile)?;

    Ok(no_content())
}

pub fn delete_user<S: Store>(ctx: &AppContext<S>, req: &Request, id: UserId) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = remove_user(ctx, req, id);
    record_operation(Operation::DeleteUser, &result, started);
    result
}

fn remove_user<S: Store>(ctx: &AppContext<S>, req: &Request, id: UserId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    policy::ensure_owner(caller, id)?;

    ctx.store.delete_user(id)?;
    tracing::info!(user_id = id, "user deleted");

    Ok(no_content())
}

pub fn update_password<S: Store>(ctx: &AppContext<S>, req: &Request, id: UserId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    policy::ensure_owner(caller, id)?;

    let change: PasswordChange = read_json(req)?;
    check_new_password(&change.new)?;

    let stored = ctx
        .store
        .password_digest(id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    policy::ensure_password_change(caller, id, &stored, &change.current)?;

    let digest = credentials::hash(&change.new)?;
    ctx.store.update_password(id, &digest)?;
    tracing::info!(user_id = id, "password changed");

    Ok(no_content())
}
