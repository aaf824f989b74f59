use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, post, put},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;

use config::Config;
use middleware::rate_limit::RateLimiter;
use services::convert::{DocConverter, PdfRenderer};
use services::mailer::Mailer;
use services::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimiter,
    pub mailer: Option<Mailer>,
    pub storage: Storage,
    pub converter: DocConverter,
    pub renderer: PdfRenderer,
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // --- Auth routes (no auth required) ---
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    // --- Organiser routes (authenticated) ---
    let event_routes = Router::new()
        .route("/", get(routes::events::list).post(routes::events::create))
        .route(
            "/:event_id",
            get(routes::events::show)
                .put(routes::events::update)
                .delete(routes::events::destroy),
        )
        .route("/:event_id/publish", post(routes::events::publish))
        .route("/:event_id/convert", post(routes::events::convert_documents))
        .route("/:event_id/email", post(routes::events::email))
        .route(
            "/:event_id/rulebook",
            post(routes::events::upload_rulebook).delete(routes::events::delete_rulebook),
        )
        .route("/:event_id/documents", post(routes::events::upload_document))
        .route(
            "/:event_id/documents/:document_id",
            axum::routing::delete(routes::events::delete_document),
        )
        .route(
            "/:event_id/teams",
            get(routes::teams::list).post(routes::teams::create),
        )
        .route(
            "/:event_id/teams/:team_id",
            get(routes::teams::show)
                .put(routes::teams::update)
                .delete(routes::teams::destroy),
        )
        .route("/:event_id/teams/:team_id/brief", post(routes::teams::upload_brief))
        .route("/:event_id/teams/:team_id/image", post(routes::teams::upload_image))
        .route("/:event_id/teams/:team_id/convert", post(routes::teams::convert_brief))
        .route(
            "/:event_id/roles",
            get(routes::roles::list).post(routes::roles::create),
        )
        .route(
            "/:event_id/roles/:role_id",
            get(routes::roles::show)
                .put(routes::roles::update)
                .delete(routes::roles::destroy),
        )
        .route("/:event_id/roles/:role_id/brief", post(routes::roles::upload_brief))
        .route("/:event_id/roles/:role_id/convert", post(routes::roles::convert_brief))
        .route(
            "/:event_id/organisers",
            get(routes::event_organisers::list).post(routes::event_organisers::create),
        )
        .route(
            "/:event_id/organisers/:membership_id",
            put(routes::event_organisers::update).delete(routes::event_organisers::destroy),
        )
        .route(
            "/:event_id/signups",
            get(routes::event_signups::list).post(routes::event_signups::create),
        )
        .route(
            "/:event_id/signups/template",
            get(routes::event_signups::generate_template),
        )
        .route("/:event_id/signups/import", post(routes::event_signups::import_csv))
        .route(
            "/:event_id/signups/cast-list",
            get(routes::event_signups::organiser_cast_list),
        )
        .route("/:event_id/signups/email", post(routes::event_signups::email))
        .route(
            "/:event_id/signups/:signup_id",
            put(routes::event_signups::update).delete(routes::event_signups::destroy),
        )
        .route(
            "/:event_id/signups/:signup_id/email",
            post(routes::event_signups::email_single),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Player-facing routes (the signup uuid is the credential) ---
    let play_routes = Router::new()
        .route("/:uuid", get(routes::play::show))
        .route("/:uuid/cast-list", get(routes::play::cast_list_pdf));

    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/events", event_routes);

    Router::new()
        .nest("/api/v1", api)
        .nest("/play", play_routes)
        .route("/download/:uuid", get(routes::download::show))
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let pool = db::create_pool(&config).await;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let storage = Storage::new(&config.storage);
    storage.init().await.expect("Failed to init blob storage");

    let rate_limiter =
        RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);
    let mailer = Mailer::new(&config.mail);
    if mailer.is_none() {
        tracing::warn!("MAIL_API_URL not set; email dispatch is disabled");
    }
    let converter = DocConverter::new(&config.documents);
    let renderer = PdfRenderer::new(&config.documents);
    let port = config.port;

    tracing::info!("Megagame Hub API initialized (Rust/Axum)");

    let state = AppState {
        db: pool,
        config: Arc::new(config),
        rate_limiter,
        mailer,
        storage,
        converter,
        renderer,
    };

    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind port");
    tracing::info!("listening on {addr}");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
