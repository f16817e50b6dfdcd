use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use huddle_gateway::assist::AssistClient;
use huddle_gateway::connection;
use huddle_gateway::handlers::{GatewayConfig, GatewayState};
use huddle_gateway::hub::Hub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("HUDDLE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("HUDDLE_DB_PATH").unwrap_or_else(|_| "huddle.db".into());
    let host = std::env::var("HUDDLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("HUDDLE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let assist_url = std::env::var("HUDDLE_ASSIST_URL").ok();
    let file_base_url = std::env::var("HUDDLE_FILE_BASE_URL").ok();
    let vectorize_channel_id: i64 = std::env::var("HUDDLE_VECTORIZE_CHANNEL_ID")
        .unwrap_or_else(|_| "1".into())
        .parse()?;
    let assistant_channel_id: i64 = std::env::var("HUDDLE_ASSISTANT_CHANNEL_ID")
        .unwrap_or_else(|_| "2".into())
        .parse()?;

    // Init database
    let db = Arc::new(huddle_db::Database::open(&PathBuf::from(&db_path))?);

    let assist = assist_url.map(AssistClient::new);
    if assist.is_none() {
        info!("HUDDLE_ASSIST_URL not set; assistant channel and vectorization disabled");
    }

    let state = GatewayState {
        hub: Hub::new(),
        db,
        assist,
        config: GatewayConfig {
            vectorize_channel_id,
            assistant_channel_id,
            file_base_url,
        },
        jwt_secret,
    };

    let app = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Huddle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state))
}
