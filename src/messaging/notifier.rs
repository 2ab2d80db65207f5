use crate::db::models::notification_models::Notification;
use crate::db::repositories::NotificationsRepository;
use crate::error::Error;
use crate::messaging::event::NotificationKind;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Callback function type for notification handling
pub type NotificationCallback = Arc<dyn Fn(Notification) -> Result<()> + Send + Sync>;

/// Notifier service trait
#[async_trait]
pub trait NotifierTrait: Send + Sync {
    /// Deliver a notification: persist it and fan it out to live
    /// subscribers
    async fn notify(&self, notification: Notification) -> Result<()>;

    /// Subscribe to one notification kind
    async fn subscribe(&self, kind: NotificationKind, callback: NotificationCallback)
        -> Result<Uuid>;

    /// Subscribe to every notification concerning one incident
    async fn subscribe_incident(
        &self,
        incident_id: Uuid,
        callback: NotificationCallback,
    ) -> Result<Uuid>;

    /// Subscribe to the full notification stream
    async fn subscribe_all(&self, callback: NotificationCallback) -> Result<Uuid>;

    /// Unsubscribe from a subscription
    async fn unsubscribe(&self, subscription_id: Uuid) -> Result<()>;
}

/// What a subscription task lets through.
#[derive(Debug, Clone)]
enum SubscriptionFilter {
    Kind(NotificationKind),
    Incident(Uuid),
    All,
}

impl SubscriptionFilter {
    fn matches(&self, notification: &Notification) -> bool {
        match self {
            SubscriptionFilter::Kind(kind) => notification.kind == *kind,
            SubscriptionFilter::Incident(id) => notification.incident_id == Some(*id),
            SubscriptionFilter::All => true,
        }
    }
}

/// Store-backed notifier with an in-process live channel
pub struct Notifier {
    /// Delivery records
    repository: NotificationsRepository,
    /// Live fan-out channel
    channel: broadcast::Sender<Notification>,
    /// Subscriptions map
    subscriptions: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>>,
}

impl Notifier {
    /// Create a new notifier
    pub fn new(repository: NotificationsRepository) -> Self {
        let (channel, _) = broadcast::channel(256);

        Self {
            repository,
            channel,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a consumer task for the given filter and callback
    async fn start_consumer(
        &self,
        filter: SubscriptionFilter,
        callback: NotificationCallback,
    ) -> Result<Uuid> {
        let subscription_id = Uuid::new_v4();
        let mut receiver = self.channel.subscribe();

        let handle = tokio::spawn(async move {
            info!("Started notification consumer (subscription: {})", subscription_id);

            loop {
                match receiver.recv().await {
                    Ok(notification) => {
                        if !filter.matches(&notification) {
                            continue;
                        }

                        debug!(
                            "Delivering notification {} ({})",
                            notification.id,
                            notification.routing_key()
                        );

                        if let Err(e) = callback(notification) {
                            error!("Error processing notification: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "Notification consumer {} lagged, skipped {} messages",
                            subscription_id, skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            info!("Notification consumer stopped (subscription: {})", subscription_id);
        });

        self.subscriptions
            .write()
            .await
            .insert(subscription_id, handle);

        Ok(subscription_id)
    }
}

#[async_trait]
impl NotifierTrait for Notifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.repository
            .create(&notification)
            .await
            .map_err(|e| Error::Notification(format!("Failed to store notification: {}", e)))?;

        let routing_key = notification.routing_key();

        // Nobody listening is fine; the stored record is the delivery
        // of record.
        let _ = self.channel.send(notification);

        debug!("Published notification with routing key: {}", routing_key);

        Ok(())
    }

    async fn subscribe(
        &self,
        kind: NotificationKind,
        callback: NotificationCallback,
    ) -> Result<Uuid> {
        self.start_consumer(SubscriptionFilter::Kind(kind), callback)
            .await
    }

    async fn subscribe_incident(
        &self,
        incident_id: Uuid,
        callback: NotificationCallback,
    ) -> Result<Uuid> {
        self.start_consumer(SubscriptionFilter::Incident(incident_id), callback)
            .await
    }

    async fn subscribe_all(&self, callback: NotificationCallback) -> Result<Uuid> {
        self.start_consumer(SubscriptionFilter::All, callback).await
    }

    async fn unsubscribe(&self, subscription_id: Uuid) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;

        if let Some(handle) = subscriptions.remove(&subscription_id) {
            handle.abort();
            info!("Unsubscribed: {}", subscription_id);
            Ok(())
        } else {
            Err(Error::not_found("subscription", subscription_id).into())
        }
    }
}

/// Create a notifier service
pub fn create_notifier(repository: NotificationsRepository) -> Arc<Notifier> {
    Arc::new(Notifier::new(repository))
}
