use clap::{Parser, Subcommand};

mod app;
mod auth;
mod catalog;
mod config;
mod error;
mod extract;
mod recipes;
mod scope;
mod state;
mod storage;
mod store;
mod users;

use crate::{config::AppConfig, state::AppState};

#[derive(Parser)]
#[command(name = "recipebox", version, about = "Multi-user recipe API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Create a staff superuser account.
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipebox=debug,axum=info,tower_http=info".to_string());
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let state = AppState::init(config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => app::serve(app::build_app(state)).await,
        Command::CreateSuperuser { email, password } => {
            let user = users::services::register_superuser(&state, &email, &password)
                .await
                .map_err(|e| anyhow::anyhow!("create superuser: {}", e))?;
            tracing::info!(user_id = user.id, email = %user.email, "superuser created");
            Ok(())
        }
    }
}
