#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::sync::Arc;

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    use plaza::config::Config;
    use plaza::core::db::init_test_data;
    use plaza::handlers::{route, AppContext};
    use plaza::store::MemoryStore;

    type Context = Arc<AppContext<MemoryStore>>;

    mod adapter {
        use spin_sdk::http::{Method, Request, Response};

        /// The parts of an actix request needed to rebuild it on a worker thread.
        pub struct Incoming {
            pub method: String,
            pub uri: String,
            pub headers: Vec<(String, String)>,
            pub body: Vec<u8>,
        }

        impl Incoming {
            pub fn from_actix(req: &actix_web::HttpRequest, body: actix_web::web::Bytes) -> Self {
                let headers = req
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
                    })
                    .collect();

                Self {
                    method: req.method().as_str().to_string(),
                    uri: req.uri().to_string(),
                    headers,
                    body: body.to_vec(),
                }
            }
        }

        pub fn to_spin_request(incoming: Incoming) -> Request {
            let method = match incoming.method.as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => Method::Other(other.to_string()),
            };

            let mut builder = Request::builder();
            builder.method(method).uri(incoming.uri.as_str());
            for (name, value) in &incoming.headers {
                builder.header(name.as_str(), value.as_str());
            }
            builder.body(incoming.body).build()
        }

        pub fn from_spin_response(resp: Response) -> (u16, Vec<u8>) {
            (*resp.status(), resp.body().to_vec())
        }

        pub fn to_actix_response(status: u16, body: Vec<u8>) -> actix_web::HttpResponse {
            let mut response = actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            );

            if body.is_empty() {
                response.finish()
            } else {
                response.content_type("application/json").body(body)
            }
        }
    }

    fn init_tracing() {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().flatten_event(true).with_current_span(true))
                .init();
        } else {
            tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
        }
    }

    pub async fn run() -> anyhow::Result<()> {
        init_tracing();

        let config = Config::from_env();
        if config.secret_key.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("PLAZA_SECRET_KEY is not set; every token operation will fail");
        }

        let metrics_handle = PrometheusBuilder::new().install_recorder()?;

        let store = MemoryStore::new();
        if std::env::var("PLAZA_SEED_DEMO").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
            init_test_data(&store)?;
        }

        let bind_addr = config.bind_addr.clone();
        let ctx: Context = Arc::new(AppContext::new(config, store));
        tracing::info!(addr = %bind_addr, "server listening");

        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(ctx.clone()))
                .app_data(web::Data::new(metrics_handle.clone()))
                .route("/metrics", web::get().to(render_metrics))
                .default_service(web::route().to(handle_all))
        })
        .bind(bind_addr.as_str())?
        .run()
        .await?;

        Ok(())
    }

    async fn render_metrics(handle: web::Data<PrometheusHandle>) -> HttpResponse {
        HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render())
    }

    async fn handle_all(req: HttpRequest, body: web::Bytes, ctx: web::Data<Context>) -> HttpResponse {
        let incoming = adapter::Incoming::from_actix(&req, body);
        let ctx = ctx.get_ref().clone();

        // Password hashing is CPU bound, keep it off the async workers.
        let result = web::block(move || {
            let resp = route(&ctx, adapter::to_spin_request(incoming));
            adapter::from_spin_response(resp)
        })
        .await;

        match result {
            Ok((status, body)) => adapter::to_actix_response(status, body),
            Err(e) => {
                tracing::error!(error = %e, "request worker failed");
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({"error": "Internal server error"}))
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
