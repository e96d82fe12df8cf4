use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_decimal::Decimal;
use ticket_marketplace::{
    config::Config,
    controllers,
    models::{Category, Ticket},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ticket marketplace API");

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port).parse()?;
    let state = AppState::new(config.clone());

    if config.app.environment == "development" {
        seed_demo_tickets(&state);
    }

    // Re-arm any pending expiries and start the drain task before taking
    // traffic, so no reservation dangles after a restart.
    state.start_expiration_worker();

    // Lifecycle events feed external consumers (catalog refresh, order
    // history); until those attach, trace them.
    let mut events = state.notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(?event, "order lifecycle event");
        }
    });

    let app = Router::new()
        .route("/", get(|| async { "Ticket Marketplace API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn seed_demo_tickets(state: &AppState) {
    let demo = [
        ("Arena tour, floor standing", Decimal::new(8900, 2), Category::Concerts),
        ("Derby, east stand row 12", Decimal::new(6500, 2), Category::Sports),
        ("Evening show, stalls B4", Decimal::new(5400, 2), Category::Theater),
        ("Two-day pass", Decimal::new(29900, 2), Category::Conferences),
    ];
    for (title, price, category) in demo {
        state.ledger.insert(Ticket::new(title, price, category));
    }
    info!("Seeded {} demo tickets", demo.len());
}
