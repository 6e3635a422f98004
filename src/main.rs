use clap::Parser;
use quizboard::{
    config::{
        Args, StartupError, build_pool, create_app, init_tracing,
        run_migrations,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    let pool = build_pool(&args.database_url)?;
    run_migrations(&pool)?;

    let state = AppState::from_args(pool, &args)?;
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!(address = %args.bind, "listening");

    axum::serve(listener, create_app(state)).await?;

    Ok(())
}
