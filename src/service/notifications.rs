use crate::error::ServiceError;
use crate::model::{Notification, Store};
use crate::service::newest_first;

/// Notifications addressed to `member_id`, newest first.
pub fn list_notifications(store: &Store, member_id: &str) -> Vec<Notification> {
    let mut items: Vec<Notification> = store
        .notifications
        .iter()
        .filter(|n| n.user_id == member_id)
        .cloned()
        .collect();
    items.sort_by(|a, b| newest_first(&a.created_at, &b.created_at));
    items
}

pub fn mark_read(
    store: &mut Store,
    member_id: &str,
    notification_id: &str,
) -> Result<Notification, ServiceError> {
    let notification = store
        .notifications
        .iter_mut()
        .find(|n| n.id == notification_id && n.user_id == member_id)
        .ok_or_else(|| ServiceError::NotFound("Notification not found".to_string()))?;
    notification.read = true;
    Ok(notification.clone())
}

/// Mark every unread notification for `member_id` as read; returns how many
/// changed.
pub fn mark_all_read(store: &mut Store, member_id: &str) -> usize {
    let mut changed = 0;
    for notification in store
        .notifications
        .iter_mut()
        .filter(|n| n.user_id == member_id && !n.read)
    {
        notification.read = true;
        changed += 1;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::store;

    #[test]
    fn listing_is_per_member_and_newest_first() {
        let store = store();
        let ids: Vec<String> = list_notifications(&store, "m-bo")
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["n-2", "n-1"]);
        assert!(list_notifications(&store, "nobody").is_empty());
    }

    #[test]
    fn mark_read_is_scoped_to_the_recipient() {
        let mut store = store();
        let read = mark_read(&mut store, "m-bo", "n-1").expect("mark");
        assert!(read.read);

        let err = mark_read(&mut store, "m-bo", "n-3").expect_err("not bo's");
        assert_eq!(err.to_string(), "Notification not found");
    }

    #[test]
    fn mark_all_read_counts_changes() {
        let mut store = store();
        mark_read(&mut store, "m-bo", "n-1").expect("mark");
        assert_eq!(mark_all_read(&mut store, "m-bo"), 1);
        assert_eq!(mark_all_read(&mut store, "m-bo"), 0);
        assert!(!store.notifications.iter().find(|n| n.id == "n-3").expect("n-3").read);
    }
}
