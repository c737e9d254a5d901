//! Paged reads for virtualized lists.
//!
//! Pages always come straight from the host and are never cached.

use std::sync::Arc;

use tracing::debug;

use crate::bridge::HostBridge;
use crate::domain::{Notification, NotificationFilter};
use crate::wire::FieldMapper;
use crate::{Error, MappingError, Result};

/// One window of a notification list.
///
/// `rows` counts the host rows the window covered, including rows dropped
/// because another profile owns them, so `items` may be shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<Notification>,
    pub offset: u32,
    pub limit: u32,
    pub rows: u32,
    pub has_more: bool,
}

impl Page {
    /// Offset of the window following this one.
    pub fn next_offset(&self) -> u32 {
        self.offset.saturating_add(self.rows)
    }
}

pub struct PaginatedLoader {
    bridge: Arc<dyn HostBridge>,
    page_size: u32,
}

impl PaginatedLoader {
    pub fn new(bridge: Arc<dyn HostBridge>, page_size: u32) -> Self {
        Self { bridge, page_size }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch `limit` items starting at `offset`.
    ///
    /// Any paging set on `filter` is overridden. One extra item is requested
    /// to find out whether another page exists.
    pub async fn load_page(
        &self,
        profile_id: &str,
        offset: u32,
        limit: u32,
        filter: Option<&NotificationFilter>,
    ) -> Result<Page> {
        if limit == 0 {
            return Err(Error::validation("page limit must be greater than zero"));
        }

        let filter = filter
            .cloned()
            .unwrap_or_default()
            .with_window(offset, limit.saturating_add(1));
        let mut wire = self
            .bridge
            .get_notifications(profile_id, &filter.to_wire())
            .await
            .map_err(Error::into_fetch)?;

        let has_more = wire.len() > limit as usize;
        wire.truncate(limit as usize);
        let rows = wire.len() as u32;

        let mut items = wire
            .into_iter()
            .map(Notification::from_wire)
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;
        items.retain(|n| n.belongs_to(profile_id));

        debug!(
            profile_id,
            offset,
            limit,
            rows,
            count = items.len(),
            has_more,
            "Loaded notification page"
        );

        Ok(Page {
            items,
            offset,
            limit,
            rows,
            has_more,
        })
    }

    /// Fetch the page after `page` with the same limit.
    pub async fn load_next(
        &self,
        profile_id: &str,
        page: &Page,
        filter: Option<&NotificationFilter>,
    ) -> Result<Page> {
        self.load_page(profile_id, page.next_offset(), page.limit, filter)
            .await
    }

    /// First page using the configured page size.
    pub async fn load_first(
        &self,
        profile_id: &str,
        filter: Option<&NotificationFilter>,
    ) -> Result<Page> {
        self.load_page(profile_id, 0, self.page_size, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{InMemoryHost, commands};
    use crate::domain::{
        NotificationContent, NotificationMetadata, NotificationPriority, NotificationType,
    };
    use chrono::{Duration, Utc};

    fn host_with(count: i64) -> Arc<InMemoryHost> {
        let host = Arc::new(InMemoryHost::new());
        let now = Utc::now();
        host.seed((0..count).map(|i| Notification {
            id: format!("n{i}"),
            profile_id: "p1".to_string(),
            kind: if i % 2 == 0 {
                NotificationType::Game
            } else {
                NotificationType::Store
            },
            content: NotificationContent::new(format!("title {i}"), "body"),
            priority: NotificationPriority::Low,
            created_at: now - Duration::minutes(i),
            read_at: None,
            expires_at: None,
            metadata: NotificationMetadata::default(),
        }));
        host
    }

    #[tokio::test]
    async fn test_pages_walk_the_list() {
        let host = host_with(5);
        let loader = PaginatedLoader::new(host.clone(), 2);

        let first = loader.load_first("p1", None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].id, "n0");
        assert!(first.has_more);

        let second = loader.load_next("p1", &first, None).await.unwrap();
        assert_eq!(second.offset, 2);
        assert_eq!(second.items[0].id, "n2");

        let last = loader.load_next("p1", &second, None).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);
        assert_eq!(host.calls(commands::GET_NOTIFICATIONS), 3);
    }

    #[tokio::test]
    async fn test_filter_is_applied() {
        let host = host_with(6);
        let loader = PaginatedLoader::new(host, 10);
        let filter = NotificationFilter::default().with_kind(NotificationType::Store);

        let page = loader.load_page("p1", 0, 10, Some(&filter)).await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.items.iter().all(|n| n.kind == NotificationType::Store));
    }

    #[tokio::test]
    async fn test_failure_is_a_fetch_error() {
        let host = host_with(1);
        host.set_offline(true);
        let loader = PaginatedLoader::new(host, 10);

        let err = loader.load_page("p1", 0, 10, None).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(loader.load_page("p1", 0, 0, None).await.is_err());
    }
}
