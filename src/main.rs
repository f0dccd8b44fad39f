use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use booking_gateway::cli;
use booking_gateway::config;
use booking_gateway::store::postgres::PgStore;
use booking_gateway::store::BookingStore;
use booking_gateway::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Auth { command }) => {
            let state = connect_state(cfg).await?;
            handle_auth_command(command, &state).await
        }
        Some(cli::Commands::Account { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_account_command(command, &db).await
        }
        Some(cli::Commands::Booking { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_booking_command(command, &db).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// fmt logging filtered by RUST_LOG, plus OTLP export when
/// OTEL_EXPORTER_OTLP_ENDPOINT is set.
fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "booking-gateway"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "booking_gateway=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    Ok(())
}

async fn connect_state(cfg: config::Config) -> anyhow::Result<Arc<AppState>> {
    let db = PgStore::connect(&cfg.database_url).await?;
    let store = Arc::new(db.clone());
    let state = AppState::build(cfg, store.clone(), store, Some(db))?;
    Ok(Arc::new(state))
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    if let Ok(email) = std::env::var("SUPER_ADMIN_EMAIL") {
        let name = std::env::var("SUPER_ADMIN_NAME").unwrap_or_else(|_| "Super Admin".into());
        if db.seed_privileged_account(&email, &name).await? {
            tracing::info!(email = %email, "Super admin account seeded");
        }
    }

    let store = Arc::new(db.clone());
    let state = Arc::new(AppState::build(cfg, store.clone(), store, Some(db))?);

    match state.auth.status().await {
        Ok(status) if status.authenticated => {
            tracing::info!(has_refresh_token = status.has_refresh_token, "Google Calendar credential loaded")
        }
        Ok(_) => tracing::warn!("Google Calendar is not connected; visit /api/v1/appointments/auth"),
        Err(e) => tracing::warn!("Could not read Google Calendar credential: {}", e),
    }

    let app = booking_gateway::api::build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Booking gateway listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Booking gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn handle_auth_command(cmd: cli::AuthCommands, state: &Arc<AppState>) -> anyhow::Result<()> {
    match cmd {
        cli::AuthCommands::Status => {
            let status = state.auth.status().await?;
            println!("Authenticated:     {}", status.authenticated);
            println!("Has refresh token: {}", status.has_refresh_token);
            match status
                .expiry_date
                .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            {
                Some(expiry) => println!("Access expires:    {}", expiry.to_rfc3339()),
                None => println!("Access expires:    -"),
            }
        }
        cli::AuthCommands::Url => {
            println!("{}", state.auth.consent_url()?);
        }
        cli::AuthCommands::Refresh => {
            state.auth.force_refresh().await?;
            println!("Access token refreshed.");
        }
        cli::AuthCommands::Revoke => {
            state.auth.revoke().await?;
            println!("Google Calendar credential cleared.");
        }
    }
    Ok(())
}

async fn handle_account_command(cmd: cli::AccountCommands, db: &PgStore) -> anyhow::Result<()> {
    match cmd {
        cli::AccountCommands::Seed { email, name } => {
            db.migrate().await?;
            if db.seed_privileged_account(&email, &name).await? {
                println!("Super admin created: {}", email);
            } else {
                println!("An account with email {} already exists.", email);
            }
            match db.get_privileged_account().await? {
                Some(account) => println!(
                    "Active privileged account: {} ({})",
                    account.email, account.id
                ),
                None => println!("Warning: no active super admin account."),
            }
        }
    }
    Ok(())
}

async fn handle_booking_command(cmd: cli::BookingCommands, db: &PgStore) -> anyhow::Result<()> {
    match cmd {
        cli::BookingCommands::List { call_log_id, limit } => {
            let call_log_id = call_log_id
                .map(|raw| uuid::Uuid::parse_str(&raw).context("Invalid call log id"))
                .transpose()?;
            let bookings = db.list_bookings(call_log_id, limit).await?;
            if bookings.is_empty() {
                println!("No bookings found.");
                return Ok(());
            }

            println!(
                "{:<38} {:<24} {:<22} {:<10} MEET",
                "ID", "TITLE", "START (UTC)", "STATUS"
            );
            for b in bookings {
                let title = if b.title.chars().count() > 24 {
                    format!("{}...", b.title.chars().take(21).collect::<String>())
                } else {
                    b.title.clone()
                };
                println!(
                    "{:<38} {:<24} {:<22} {:<10} {}",
                    b.id,
                    title,
                    b.start_time.format("%Y-%m-%d %H:%M"),
                    b.status,
                    b.meet_link.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}
