use std::time::Instant;

use spin_sdk::http::{Request, Response};

use crate::auth::authenticate;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, no_content, read_json, sanitize_text};
use crate::handlers::AppContext;
use crate::metrics::{record_operation, Operation};
use crate::models::{NewPost, Post, PostId, PostInput, UserId};
use crate::security::policy;
use crate::store::Store;

fn prepare_post(input: &PostInput) -> Result<NewPost, ApiError> {
    let title = sanitize_text(input.title.trim());
    let content = sanitize_text(input.content.trim());

    if title.is_empty() || content.is_empty() {
        return Err(ApiError::BadRequest("Title and content are required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::BadRequest("Title must be at most 50 characters".to_string()));
    }
    if content.chars().count() > MAX_POST_LENGTH {
        return Err(ApiError::BadRequest("Content must be at most 300 characters".to_string()));
    }

    Ok(NewPost { title, content })
}

fn find_post<S: Store>(ctx: &AppContext<S>, id: PostId) -> Result<Post, ApiError> {
    ctx.store
        .post_by_id(id)?
        .ok_or_else(|| ApiError::NotFound("Publication not found".to_string()))
}

pub fn create_post<S: Store>(ctx: &AppContext<S>, req: &Request) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = publish(ctx, req);
    record_operation(Operation::CreatePublication, &result, started);
    result
}

fn publish<S: Store>(ctx: &AppContext<S>, req: &Request) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    let post = prepare_post(&read_json(req)?)?;

    let created = ctx.store.create_post(caller, &post)?;
    tracing::info!(post_id = created.id, author = caller, "publication created");

    json_response(201, &created)
}

pub fn get_feed<S: Store>(ctx: &AppContext<S>, req: &Request) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    json_response(200, &ctx.store.feed(caller)?)
}

pub fn get_post<S: Store>(ctx: &AppContext<S>, req: &Request, id: PostId) -> Result<Response, ApiError> {
    authenticate(ctx, req)?;
    json_response(200, &find_post(ctx, id)?)
}

pub fn edit_post<S: Store>(ctx: &AppContext<S>, req: &Request, id: PostId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    let existing = find_post(ctx, id)?;
    policy::ensure_owner(caller, existing.author_id)?;

    let post = prepare_post(&read_json(req)?)?;
    ctx.store.update_post(id, &post)?;

    Ok(no_content())
}

pub fn delete_post<S: Store>(ctx: &AppContext<S>, req: &Request, id: PostId) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = remove_post(ctx, req, id);
    record_operation(Operation::DeletePublication, &result, started);
    result
}

fn remove_post<S: Store>(ctx: &AppContext<S>, req: &Request, id: PostId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    let existing = find_post(ctx, id)?;
    policy::ensure_owner(caller, existing.author_id)?;

    ctx.store.delete_post(id)?;
    tracing::info!(post_id = id, "publication deleted");

    Ok(no_content())
}

pub fn user_posts<S: Store>(ctx: &AppContext<S>, req: &Request, author: UserId) -> Result<Response, ApiError> {
    authenticate(ctx, req)?;
    json_response(200, &ctx.store.posts_by_author(author)?)
}

pub fn like_post<S: Store>(ctx: &AppContext<S>, req: &Request, id: PostId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    ctx.store.like(id, caller)?;
    Ok(no_content())
}

pub fn unlike_post<S: Store>(ctx: &AppContext<S>, req: &Request, id: PostId) -> Result<Response, ApiError> {
    let caller = authenticate(ctx, req)?;
    ctx.store.unlike(id, caller)?;
    Ok(no_content())
}

pub fn get_likers<S: Store>(ctx: &AppContext<S>, req: &Request, id: PostId) -> Result<Response, ApiError> {
    authenticate(ctx, req)?;
    json_response(200, &ctx.store.likers(id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, content: &str) -> PostInput {
        PostInput { title: title.to_string(), content: content.to_string() }
    }

    #[test]
    fn markup_is_stripped() {
        let post = prepare_post(&input(" Hi ", "<script>x()</script>hello <i>there</i>")).unwrap();
        assert_eq!(post.title, "Hi");
        assert_eq!(post.content, "hello there");
    }

    #[test]
    fn empty_or_oversized_posts_are_rejected() {
        assert!(prepare_post(&input("", "body")).is_err());
        assert!(prepare_post(&input("title", "   ")).is_err());
        assert!(prepare_post(&input(&"t".repeat(51), "body")).is_err());
        assert!(prepare_post(&input("title", &"c".repeat(301))).is_err());
        assert!(prepare_post(&input("title", &"c".repeat(300))).is_ok());
    }

    #[test]
    fn limits_count_characters_not_entities() {
        let post = prepare_post(&input(&"&".repeat(50), "Tom & Jerry")).unwrap();
        assert_eq!(post.title.chars().count(), 50);
        assert_eq!(post.content, "Tom & Jerry");
    }
}
