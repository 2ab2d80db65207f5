#[cfg(test)]
mod tests {
    use crate::messaging::event::{NotificationKind, RecipientKind};
    use crate::messaging::notifier::create_notifier;
    use crate::db::memory::MemoryStore;
    use crate::db::models::notification_models::Notification;
    use crate::db::repositories::NotificationsRepository;
    use crate::messaging::NotifierTrait;
    use anyhow::Result;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::sleep;
    use uuid::Uuid;

    // Test that delivery both persists and reaches a live subscriber
    #[tokio::test]
    async fn test_notify_persists_and_fans_out() -> Result<()> {
        let repository = NotificationsRepository::new(MemoryStore::shared());
        let notifier = create_notifier(repository.clone());

        // Create a variable to hold received notifications
        let received = Arc::new(Mutex::new(Vec::<Notification>::new()));
        let received_clone = received.clone();

        // Subscribe to hospital notifications
        let _sub_id = notifier
            .subscribe(
                NotificationKind::HospitalNotified,
                Arc::new(move |notification| {
                    let mut notifications = received_clone.lock().unwrap();
                    notifications.push(notification);
                    Ok(())
                }),
            )
            .await?;

        let incident_id = Uuid::new_v4();
        notifier
            .notify(Notification::new(
                RecipientKind::Hospital,
                Some("hospital-1".into()),
                Some(incident_id),
                NotificationKind::HospitalNotified,
                "new incident nearby",
            ))
            .await?;

        // A notification of another kind must not reach this consumer
        notifier
            .notify(Notification::new(
                RecipientKind::Reporter,
                Some("user-1".into()),
                Some(incident_id),
                NotificationKind::HospitalAccepted,
                "a hospital accepted",
            ))
            .await?;

        // Wait for fan-out to land
        sleep(Duration::from_millis(100)).await;

        let notifications = received.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::HospitalNotified);

        // Both are on record regardless of subscriptions
        drop(notifications);
        let stored = repository.get_all().await?;
        assert_eq!(stored.len(), 2);

        Ok(())
    }

    // Test that incident-scoped subscriptions only see their incident
    #[tokio::test]
    async fn test_incident_subscription_filters() -> Result<()> {
        let repository = NotificationsRepository::new(MemoryStore::shared());
        let notifier = create_notifier(repository);

        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        let received = Arc::new(Mutex::new(Vec::<Notification>::new()));
        let received_clone = received.clone();

        let sub_id = notifier
            .subscribe_incident(
                watched,
                Arc::new(move |notification| {
                    received_clone.lock().unwrap().push(notification);
                    Ok(())
                }),
            )
            .await?;

        for incident_id in [watched, other, watched] {
            notifier
                .notify(Notification::new(
                    RecipientKind::Responder,
                    None,
                    Some(incident_id),
                    NotificationKind::IncidentClaimable,
                    "incident open for claims",
                ))
                .await?;
        }

        sleep(Duration::from_millis(100)).await;

        assert_eq!(received.lock().unwrap().len(), 2);

        // Unsubscribing twice reports the missing subscription
        notifier.unsubscribe(sub_id).await?;
        assert!(notifier.unsubscribe(sub_id).await.is_err());

        Ok(())
    }
}
