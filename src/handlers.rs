use std::time::Instant;

use spin_sdk::http::{Method, Request, Response};

use crate::config::Config;
use crate::core::errors::ApiError;
use crate::core::helpers::parse_id;
use crate::metrics::{self, InFlight};
use crate::security::TokenService;
use crate::store::Store;
use crate::{auth, follow, health, posts, users};

/// Everything a handler needs for one request.
pub struct AppContext<S> {
    pub config: Config,
    pub tokens: TokenService,
    pub store: S,
}

impl<S: Store> AppContext<S> {
    pub fn new(config: Config, store: S) -> Self {
        let tokens = TokenService::new(&config);
        Self { config, tokens, store }
    }
}

fn method_name(method: &Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
        Method::Put => "PUT",
        Method::Delete => "DELETE",
        Method::Patch => "PATCH",
        Method::Head => "HEAD",
        Method::Options => "OPTIONS",
        _ => "OTHER",
    }
}

fn dispatch<S: Store>(ctx: &AppContext<S>, req: &Request, method: &str) -> Result<Response, ApiError> {
    let path = req.path().trim_end_matches('/');
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        ("GET", ["live"]) => health::live(),
        ("GET", ["ready"]) => health::ready(ctx),

        ("POST", ["login"]) => auth::login_user(ctx, req),

        ("POST", ["users"]) => users::create_user(ctx, req),
        ("GET", ["users"]) => users::search_users(ctx, req),
        ("GET", ["users", id]) => users::get_user(ctx, req, parse_id(id, "user")?),
        ("PUT", ["users", id]) => users::update_user(ctx, req, parse_id(id, "user")?),
        ("DELETE", ["users", id]) => users::delete_user(ctx, req, parse_id(id, "user")?),
        ("POST", ["users", id, "updatepass"]) => users::update_password(ctx, req, parse_id(id, "user")?),

        ("POST", ["users", id, "follow"]) => follow::follow_user(ctx, req, parse_id(id, "user")?),
        ("POST", ["users", id, "unfollow"]) => follow::unfollow_user(ctx, req, parse_id(id, "user")?),
        ("GET", ["users", id, "followers"]) => follow::get_followers(ctx, req, parse_id(id, "user")?),
        ("GET", ["users", id, "following"]) => follow::get_following(ctx, req, parse_id(id, "user")?),
        ("GET", ["users", id, "publications"]) => posts::user_posts(ctx, req, parse_id(id, "user")?),

        ("POST", ["publications"]) => posts::create_post(ctx, req),
        ("GET", ["publications"]) => posts::get_feed(ctx, req),
        ("GET", ["publications", id]) => posts::get_post(ctx, req, parse_id(id, "publication")?),
        ("PUT", ["publications", id]) => posts::edit_post(ctx, req, parse_id(id, "publication")?),
        ("DELETE", ["publications", id]) => posts::delete_post(ctx, req, parse_id(id, "publication")?),
        ("POST", ["publications", id, "like"]) => posts::like_post(ctx, req, parse_id(id, "publication")?),
        ("POST", ["publications", id, "unlike"]) => posts::unlike_post(ctx, req, parse_id(id, "publication")?),
        ("GET", ["publications", id, "likers"]) => posts::get_likers(ctx, req, parse_id(id, "publication")?),

        _ => Err(ApiError::NotFound("No route found".to_string())),
    }
}

/// Routes one request and turns any error into its HTTP response.
pub fn route<S: Store>(ctx: &AppContext<S>, req: Request) -> Response {
    let method = method_name(req.method());
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("request", %request_id, method, path = req.path());
    let _entered = span.enter();
    let _in_flight = InFlight::start();
    let started = Instant::now();

    let response = match dispatch(ctx, &req, method) {
        Ok(resp) => {
            tracing::debug!(status = *resp.status(), "handled");
            resp
        }
        Err(err) => {
            let status = err.status();
            if status >= 500 {
                tracing::error!(status, error = %err, "request failed");
            } else {
                tracing::debug!(status, error = %err, "request rejected");
            }
            err.into()
        }
    };

    metrics::record_http_request(method, req.path(), *response.status(), started.elapsed().as_secs_f64());
    response
}
