//! Show-config command implementation

use anyhow::{Context, Result};
use orb_signal::config::Config;
use tracing::info;

pub fn run(config_path: String) -> Result<()> {
    dotenv::dotenv().ok();

    let mut config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    info!("Configuration in {} is valid", config_path);

    if let Some(telegram) = config.notifier.telegram.as_mut() {
        telegram.bot_token = "***".to_string();
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
