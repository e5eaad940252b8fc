//! L.E.A.F server binary

use leaf_server::{api, core, db};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting L.E.A.F server v{}", leaf_server::VERSION);
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Server configuration"
    );
    info!(path = ?config.database.path, "Database configuration");

    if let Some(dir) = config.database.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            info!("Creating directory: {:?}", dir);
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow::anyhow!("Failed to create directory {:?}: {}", dir, e))?;
        }
    }

    info!("Initializing database...");
    let db = Arc::new(db::DatabaseManager::new(
        &config.database.path,
        config.database.connection_pool_size as u32,
        std::time::Duration::from_millis(config.database.busy_timeout),
    )?);
    info!("Running database migrations...");
    db.migrate()?;
    info!("Database initialized successfully");

    ensure_admin_user(db.clone(), &config.seed).await?;

    if config.seed.catalog_on_startup {
        core::seed::seed_achievements(&db).await?;
        core::seed::seed_power_ups(&db).await?;
    }
    if config.seed.sample_books {
        core::seed::seed_sample_books(&db).await?;
    }

    let config = Arc::new(config);
    let leeches = Arc::new(core::LeechService::new(db.clone(), config.gamification.clone()));
    let _scheduler = leeches.start_scheduler();

    let server_url = format!("http://{}:{}", config.server.host, config.server.port);
    let server = api::ApiServer::new(config, db);
    info!(url = %server_url, "Server ready - starting to serve requests");

    server.serve().await?;

    Ok(())
}

/// Create the configured admin account when the database has no users
async fn ensure_admin_user(
    db: Arc<db::DatabaseManager>,
    seed: &core::config::SeedConfig,
) -> Result<()> {
    use leaf_server::auth::hash_password;
    use leaf_server::core::utils::now_timestamp;
    use leaf_server::db::models::User;
    use leaf_server::db::repository::{Repository, UserRepository};
    use uuid::Uuid;

    let user_repo = UserRepository::new(db);
    if user_repo.count().await? > 0 {
        return Ok(());
    }

    info!("No users found, creating default admin user...");
    let admin = User {
        id: Uuid::new_v4().to_string(),
        username: seed.admin_username.clone(),
        email: seed.admin_email.clone(),
        password_hash: hash_password(&seed.admin_password)?,
        first_name: None,
        last_name: None,
        description: None,
        role: "admin".to_string(),
        is_active: true,
        created_at: now_timestamp(),
        last_activity: None,
    };
    user_repo.create(&admin).await?;
    info!(username = %admin.username, "Default admin user created");

    Ok(())
}
