use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use cargo_hub::auth::{
    AuthDatabase, AuthService, AuthState, EmailSender, KeyValueStore, MemoryStore,
    PresenceTracker, RedisStore, TokenCodec,
};
use cargo_hub::logging::setup_logging;
use cargo_hub::{ApiServer, ApiServerConfig, AppConfig};

const INVITATION_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// PRESENCE STORE
// ============================================================================

async fn open_presence_store(redis_url: Option<&str>) -> cargo_hub::Result<Arc<dyn KeyValueStore>> {
    match redis_url {
        Some(url) => {
            let store = RedisStore::new(url)?;
            match store.ping().await {
                Ok(()) => log::info!("Presence backed by Redis"),
                Err(e) => log::warn!("Redis not reachable yet ({}), presence calls will fail until it is", e),
            }
            Ok(Arc::new(store))
        }
        None => {
            log::warn!("No Redis URL configured, presence is kept in process memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

// ============================================================================
// INVITATION CLEANER
// ============================================================================

fn spawn_invitation_cleaner(state: Arc<AuthState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(INVITATION_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            match state.service.purge_expired_invitations().await {
                Ok(0) => {}
                Ok(n) => log::info!("Removed {} expired invitations", n),
                Err(e) => log::error!("Invitation cleanup failed: {}", e),
            }
        }
    });
}

// ============================================================================
// MAIN
// ============================================================================

#[tokio::main]
async fn main() -> cargo_hub::Result<()> {
    let config = AppConfig::parse();

    let _logger = setup_logging(&config.log_level, config.log_dir.as_deref())?;
    log::info!("{} v{} starting", cargo_hub::NAME, cargo_hub::VERSION);

    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Arc::new(AuthDatabase::new(&config.database_path)?);
    log::info!("Credential store opened (db: {})", config.database_path);

    let presence = PresenceTracker::new(
        open_presence_store(config.redis_url.as_deref()).await?,
        config.store_timeout(),
    );

    let service = AuthService::new(
        db.clone(),
        db,
        TokenCodec::new(config.jwt_config()),
        presence,
        EmailSender::from_env(),
        config.front_uri.clone(),
        config.store_timeout(),
    );

    if let Some((email, password)) = config.admin_credentials() {
        service.ensure_admin(email, password).await?;
    }

    let state = Arc::new(AuthState::new(service, config.secure_cookies));
    spawn_invitation_cleaner(state.clone());

    let server_config = ApiServerConfig {
        host: config.host.clone(),
        port: config.port,
        front_uri: config.front_uri.clone(),
    };
    ApiServer::new(server_config, state).start().await
}
