pub mod auth;
pub mod config;
pub mod core;
pub mod follow;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod models;
pub mod posts;
pub mod security;
pub mod store;
pub mod users;

#[cfg(target_arch = "wasm32")]
mod component {
    use spin_sdk::http::{Request, Response};
    use spin_sdk::http_component;

    use crate::config::Config;
    use crate::handlers::{route, AppContext};
    use crate::store::SqliteStore;

    // Spin gives each request a fresh instance, so the context is built per call.
    #[http_component]
    fn handle_request(req: Request) -> anyhow::Result<Response> {
        let store = SqliteStore::open_default()?;
        let ctx = AppContext::new(Config::from_env(), store);
        Ok(route(&ctx, req))
    }
}
