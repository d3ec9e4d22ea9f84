mod achievements;
mod app;
mod auth;
mod catalog;
mod config;
mod error;
mod progress;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "kodefun=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    sqlx::migrate!("./migrations").run(&app_state.db).await?;

    // The unlock propagator assumes contiguous course ordering; surface
    // catalog violations at startup instead of at unlock time.
    match catalog::repo::verify_order_contiguity(&app_state.db).await {
        Ok(violations) => {
            for v in &violations {
                tracing::error!(
                    track_id = %v.track_id,
                    track = %v.track_name,
                    orders = ?v.orders,
                    "course ordering is not contiguous"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "course ordering check failed"),
    }

    let app = app::build_app(app_state);
    app::serve(app).await
}
