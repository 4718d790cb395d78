use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::collector;
use crate::config::Config;
use crate::storage;
use crate::vk::VkClient;

/// Fetch a user's profile, subscriptions and followers and save them to the
/// configured output file
pub async fn execute(config: &Config) -> Result<PathBuf> {
    info!(
        "Collecting VK data for user {user_id}",
        user_id = config.user_id()
    );

    let client = VkClient::new(config).context("Failed to initialize VK client")?;
    let data = collector::collect_user_data(&client, config.user_id()).await?;

    let saved_path = storage::save_vk_data(&data, config.output_path())
        .context("Failed to save VK data")?;

    info!(
        "Successfully saved VK data for user {user_id} to {path}",
        user_id = config.user_id(),
        path = saved_path.display()
    );

    Ok(saved_path)
}
