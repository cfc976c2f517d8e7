mod auth;
mod config;
mod db;
mod error;
mod game;
mod mail;
mod models;
mod routes;
mod websocket;

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use axum::Router;
use config::Config;
use dashmap::{mapref::entry::Entry, DashMap};
use game::PlayState;
use mail::Mailer;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use websocket::messages::ServerMessage;

/// Sessions without any host action for this long are removed
pub const PLAY_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
/// How often the cleanup task scans for idle sessions
pub const PLAY_SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Length of generated play session join codes
pub const JOIN_CODE_LENGTH: usize = 6;

/// A game being played live, kept in memory only
#[derive(Debug)]
pub struct PlaySession {
    pub session_id: Uuid,
    pub game_id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    /// Short code spectators use to find the session
    pub join_code: String,
    pub state: PlayState,
    /// Open WebSocket connections, keyed by connection id
    pub subscribers: HashMap<Uuid, mpsc::Sender<ServerMessage>>,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl PlaySession {
    pub fn new(game_id: Uuid, host_id: Uuid, title: String, state: PlayState) -> Self {
        let now = Instant::now();
        Self {
            session_id: Uuid::new_v4(),
            game_id,
            host_id,
            title,
            join_code: generate_join_code(),
            state,
            subscribers: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host_id == user_id
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity) > PLAY_SESSION_IDLE_TIMEOUT
    }
}

/// Generate a short, readable join code
fn generate_join_code() -> String {
    auth::generate_code(JOIN_CODE_LENGTH)
}

/// Application state shared across all handlers
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub mailer: Mailer,
    /// Live play sessions keyed by session id
    pub play_sessions: DashMap<Uuid, PlaySession>,
    /// Index from join code to session id for spectator lookup
    pub join_code_index: DashMap<String, Uuid>,
    /// Checked when a login names an unknown email, at the same bcrypt cost
    /// as real accounts
    pub dummy_password_hash: String,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, http_client: reqwest::Client) -> Result<Self> {
        let mailer = Mailer::new(config.mail.clone(), http_client);
        let dummy_password_hash =
            bcrypt::hash(auth::generate_reset_token(), config.security.bcrypt_cost)?;
        Ok(Self {
            config,
            db,
            mailer,
            play_sessions: DashMap::new(),
            join_code_index: DashMap::new(),
            dummy_password_hash,
        })
    }

    /// Register a new session, regenerating its join code on collision
    pub fn insert_play_session(&self, mut session: PlaySession) -> Uuid {
        let session_id = session.session_id;
        // Claim the code atomically so two sessions never share one
        loop {
            match self.join_code_index.entry(session.join_code.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(session_id);
                    break;
                }
                Entry::Occupied(_) => session.join_code = generate_join_code(),
            }
        }
        self.play_sessions.insert(session_id, session);
        session_id
    }

    /// Remove a session and its join code, returning it if it existed
    pub fn remove_play_session(&self, session_id: Uuid) -> Option<PlaySession> {
        let (_, session) = self.play_sessions.remove(&session_id)?;
        self.join_code_index.remove(&session.join_code);
        Some(session)
    }
}

/// Router with every endpoint, shared by `main` and the router tests
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = match state
        .config
        .server
        .frontend_url
        .parse::<axum::http::HeaderValue>()
    {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request()),
        Err(_) => {
            tracing::warn!(
                "FRONTEND_URL {} is not a valid origin; CORS requests will be rejected",
                state.config.server.frontend_url
            );
            CorsLayer::new()
        }
    };

    routes::create_routes()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compyy_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Compyy backend server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Connect to database
    let db = db::create_pool(config.database_url(), config.database.max_connections).await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    // Create shared HTTP client for reusing connections
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    tracing::info!("HTTP client initialized");

    let state = Arc::new(AppState::new(config.clone(), db, http_client)?);
    if !state.mailer.is_configured() {
        tracing::warn!("MAIL_API_URL not set; password reset links will only be logged");
    }

    // Spawn background task to evict idle play sessions
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        play_session_cleanup_task(cleanup_state).await;
    });

    let app = build_router(state);

    // Start server
    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Background task that periodically removes idle play sessions
async fn play_session_cleanup_task(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(PLAY_SESSION_SWEEP_INTERVAL);

    loop {
        interval.tick().await;
        sweep_idle_sessions(&state, Instant::now());
    }
}

/// Remove sessions idle at `now`, telling their viewers the session ended
fn sweep_idle_sessions(state: &AppState, now: Instant) -> usize {
    let idle: Vec<Uuid> = state
        .play_sessions
        .iter()
        .filter(|entry| entry.is_idle(now))
        .map(|entry| *entry.key())
        .collect();

    for session_id in &idle {
        if let Some(session) = state.remove_play_session(*session_id) {
            websocket::notify_session_ended(&session);
            tracing::info!(
                "Removed idle play session {} for game {} (idle timeout expired)",
                session_id,
                session.game_id
            );
        }
    }

    idle.len()
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    /// State whose pool never connects unless a query runs
    pub fn test_state() -> Arc<AppState> {
        let config = Config::for_tests();
        let db = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(config.database_url())
            .expect("valid database url");
        state_with_pool(db)
    }

    pub fn state_with_pool(db: PgPool) -> Arc<AppState> {
        Arc::new(AppState::new(Config::for_tests(), db, reqwest::Client::new()).expect("app state"))
    }

    /// Migrated pool for the database in `DATABASE_URL`.
    /// Returns `None` when it is unset so database tests skip.
    pub async fn database() -> Option<PgPool> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("Skipping: DATABASE_URL not set");
            return None;
        };
        let pool = db::create_pool(&url, 5)
            .await
            .expect("Failed to connect to test database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        Some(pool)
    }

    pub fn bearer(state: &AppState, user_id: Uuid) -> String {
        let token =
            auth::generate_token(user_id, "test_teacher", &state.config.security.jwt_secret, 1)
                .expect("token");
        format!("Bearer {}", token)
    }
}
