use crate::vk::VkClient;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

const METHOD_USERS_GET: &str = "users.get";
const METHOD_GET_SUBSCRIPTIONS: &str = "users.getSubscriptions";
const METHOD_GET_FOLLOWERS: &str = "users.getFollowers";

// Fields requested for each call
const USER_FIELDS: &str = "followers_count";
const FOLLOWER_FIELDS: &str = "first_name,last_name,city,bdate";

/// Everything collected for one user. The values are whatever VK returned,
/// passed through without interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VkData {
    pub user_info: Value,
    pub subscriptions: Value,
    pub followers: Value,
}

/// Fetches profile, subscriptions and followers for `user_id`, in that order.
///
/// The first failure aborts the run; later requests are not sent.
pub async fn collect_user_data(client: &VkClient, user_id: u64) -> Result<VkData> {
    let user_id = user_id.to_string();

    info!("Fetching profile for user {user_id}");
    let user_info = client
        .call(
            METHOD_USERS_GET,
            &[("user_ids", user_id.as_str()), ("fields", USER_FIELDS)],
        )
        .await
        .with_context(|| format!("Failed to fetch user info for {user_id}"))?;

    info!("Fetching subscriptions for user {user_id}");
    let subscriptions = client
        .call(
            METHOD_GET_SUBSCRIPTIONS,
            &[("user_id", user_id.as_str()), ("extended", "1")],
        )
        .await
        .with_context(|| format!("Failed to fetch subscriptions for {user_id}"))?;

    info!("Fetching followers for user {user_id}");
    let followers = client
        .call(
            METHOD_GET_FOLLOWERS,
            &[("user_id", user_id.as_str()), ("fields", FOLLOWER_FIELDS)],
        )
        .await
        .with_context(|| format!("Failed to fetch followers for {user_id}"))?;

    Ok(VkData {
        user_info,
        subscriptions,
        followers,
    })
}
