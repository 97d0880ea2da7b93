use collabcanvas::config::RelayConfig;
use collabcanvas::relay::{self, RelayState};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::from_env();
    let app = relay::app(RelayState::default());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;

    tracing::info!(port = config.port, "collabcanvas relay listening");
    axum::serve(listener, app).await
}
