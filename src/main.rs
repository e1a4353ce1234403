use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymledger::config::Config;
use gymledger::db::{create_pool, init_db, queries, AppState};
use gymledger::engine::ReconciliationEngine;
use gymledger::gateway::{GatewayClient, GatewayConfig};
use gymledger::handlers;
use gymledger::models::{CreateMembership, CreateStoreProduct, CreateUser};
use gymledger::notify::LogNotifier;

#[derive(Parser, Debug)]
#[command(name = "gymledger")]
#[command(about = "Payment and fulfillment reconciliation engine for a gym backend")]
struct Cli {
    /// Seed the database with dev data (user, membership, store products)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seed");

    let user = queries::create_user(
        &conn,
        &CreateUser {
            email: "demo@example.com".to_string(),
            name: "Demo Member".to_string(),
        },
    )
    .expect("Failed to seed user");

    let now = chrono::Utc::now().timestamp();
    let membership = queries::create_membership(
        &conn,
        &CreateMembership {
            user_id: user.id.clone(),
            plan_name: "Monthly".to_string(),
            billing_period_days: 30,
            start_date: now,
            end_date: now + 30 * 86_400,
        },
    )
    .expect("Failed to seed membership");

    for (name, sku, price_cents, stock) in [
        ("Protein Bar", "BAR-001", 350, 120),
        ("Shaker Bottle", "SHK-001", 1200, 40),
        ("Gym Towel", "TWL-001", 900, 25),
    ] {
        queries::create_store_product(
            &conn,
            &CreateStoreProduct {
                name: name.to_string(),
                sku: sku.to_string(),
                price_cents,
                stock_quantity: stock,
                min_stock: 5,
            },
        )
        .expect("Failed to seed product");
    }

    tracing::info!(
        user_id = %user.id,
        membership_id = %membership.id,
        "seeded dev data"
    );
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let gateway = Arc::new(GatewayClient::new(&GatewayConfig {
        api_base: config.gateway_api_base.clone(),
        secret_key: config.gateway_secret_key.clone(),
        webhook_secret: config.gateway_webhook_secret.clone(),
    }));
    let engine = Arc::new(ReconciliationEngine::new(
        db_pool.clone(),
        Arc::new(LogNotifier),
    ));

    let state = AppState {
        db: db_pool,
        engine,
        gateway,
        base_url: config.base_url.clone(),
        currency: config.currency.clone(),
    };

    if cli.seed {
        if !config.dev_mode {
            eprintln!("--seed requires GYMLEDGER_ENV=dev");
            std::process::exit(1);
        }
        seed_dev_data(&state);
    }

    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Gymledger server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&config.database_path) {
            tracing::warn!("Failed to remove {}: {}", config.database_path, e);
        }
    }
}
