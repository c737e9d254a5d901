use std::sync::Arc;

use chrono::Utc;
use notification_sync::bridge::InMemoryHost;
use notification_sync::cache::NotificationCaches;
use notification_sync::domain::{CreateNotificationRequest, NotificationPriority, NotificationType};
use notification_sync::logging::{DEFAULT_LOG_FILTER, LogFormat, init_logging};
use notification_sync::{NotificationCenter, SyncConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Also loads .env, so RUST_LOG set there applies below
    let config = SyncConfig::from_env()?;

    let format = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    let _logging = init_logging(DEFAULT_LOG_FILTER, format)?;

    let profile_id = std::env::var("NOTIFICATION_PROFILE").unwrap_or_else(|_| "demo".to_string());

    let host = Arc::new(InMemoryHost::from_config(&config));
    let caches = NotificationCaches::with_ttl(config.cache_ttl());
    let center = NotificationCenter::open(profile_id.clone(), host.clone(), caches, config)?;
    center.load().await?;

    let welcome = CreateNotificationRequest::new(
        profile_id.clone(),
        NotificationType::System,
        "Welcome",
        "Notifications are synced with the host",
    );
    let update = CreateNotificationRequest::new(
        profile_id.clone(),
        NotificationType::Update,
        "Update available",
        "A new version is ready to install",
    )
    .with_priority(NotificationPriority::High)
    .with_expiry(Utc::now() + chrono::Duration::days(7));

    for request in [welcome, update] {
        center.create(request).await?;
    }

    let ids: Vec<String> = center.notifications().into_iter().map(|n| n.id).collect();
    center.mark_multiple_as_read(&ids).await?;
    center.flush().await?;
    center.refresh().await?;

    let counts = center.counts();
    tracing::info!(
        profile_id = %profile_id,
        total = counts.total,
        unread = counts.unread,
        stored = host.stored(&profile_id).len(),
        "Demo finished"
    );

    if let Some(error) = center.error() {
        anyhow::bail!("notification center reported an error: {error}");
    }

    center.close();
    Ok(())
}
