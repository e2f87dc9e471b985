//! Idea Pulse: binary entrypoint
//! Boots the Axum HTTP server behind Shuttle.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    idea_pulse::telemetry::enable_dev_tracing();

    let router = idea_pulse::app().await?;
    Ok(router.into())
}
