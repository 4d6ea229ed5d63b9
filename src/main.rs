use std::sync::Arc;

use property_favorites::{
    api::{ApiClient, StaticCredentials},
    config::Config,
    storage::LocalStore,
    sync::SyncService,
};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = Config::from_env()?;

    let credentials = Arc::new(StaticCredentials::new(cfg.api_token.clone()));
    let client = ApiClient::new(
        cfg.api_base_url.clone(),
        credentials.clone(),
        cfg.retry_policy(),
    );
    let store = LocalStore::new(cfg.storage_path.clone());

    let mut session = SyncService::new(store, client, credentials);
    session.initialize().await;

    let saved = session.saved_properties();

    println!("\n==============================");
    println!("SAVED PROPERTIES: {}", saved.len());
    println!("==============================\n");

    for record in saved {
        match &record.title {
            Some(title) => println!("{}  {}", record.id, title),
            None => println!("{}", record.id),
        }
    }

    Ok(())
}
