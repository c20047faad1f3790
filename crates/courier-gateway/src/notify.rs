use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use courier_types::push::{PushData, PushPayload, PushSubscription};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    WebPush(#[from] web_push::WebPushError),
    #[error("{0}")]
    Transport(String),
}

pub type PushFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>>;

/// Outbound push transport: submit one payload to one subscription.
pub trait PushSender: Send + Sync + 'static {
    fn send<'a>(&'a self, subscription: &'a PushSubscription, payload: &'a [u8]) -> PushFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub private_key: String,
    pub public_key: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub enum VapidConfigStatus {
    Missing,
    Incomplete,
    Ready(VapidConfig),
}

impl VapidConfigStatus {
    pub fn from_parts(
        private_key: Option<String>,
        public_key: Option<String>,
        subject: Option<String>,
    ) -> Self {
        let has_any = private_key.is_some() || public_key.is_some() || subject.is_some();
        match (private_key, public_key, subject) {
            (Some(private_key), Some(public_key), Some(subject)) => Self::Ready(VapidConfig {
                private_key,
                public_key,
                subject,
            }),
            _ if has_any => Self::Incomplete,
            _ => Self::Missing,
        }
    }
}

/// Web Push (RFC 8030) transport signed with the server's VAPID key.
#[derive(Clone)]
pub struct WebPushSender {
    vapid: VapidConfig,
    client: Arc<web_push::WebPushClient>,
}

impl WebPushSender {
    pub fn new(vapid: VapidConfig) -> Result<Self, web_push::WebPushError> {
        let client = web_push::WebPushClient::new()?;
        Ok(Self {
            vapid,
            client: Arc::new(client),
        })
    }
}

impl PushSender for WebPushSender {
    fn send<'a>(&'a self, subscription: &'a PushSubscription, payload: &'a [u8]) -> PushFuture<'a> {
        Box::pin(async move {
            let subscription_info = web_push::SubscriptionInfo::new(
                subscription.endpoint.clone(),
                subscription.keys.p256dh.clone(),
                subscription.keys.auth.clone(),
            );
            let mut builder = web_push::WebPushMessageBuilder::new(&subscription_info)?;
            builder.set_payload(web_push::ContentEncoding::Aes128Gcm, payload);
            let mut signature_builder = web_push::VapidSignatureBuilder::from_base64(
                &self.vapid.private_key,
                web_push::URL_SAFE_NO_PAD,
                &subscription_info,
            )?;
            signature_builder.add_claim("sub", self.vapid.subject.as_str());
            builder.set_vapid_signature(signature_builder.build()?);
            self.client.send(builder.build()?).await?;
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Sent,
    Failed,
    /// No transport configured; nothing was attempted.
    Disabled,
}

/// Formats and submits offline notifications. Failures are logged and
/// reported as [`PushOutcome::Failed`], never propagated.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Option<Arc<dyn PushSender>>,
}

impl NotificationDispatcher {
    pub fn new(sender: Arc<dyn PushSender>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn payload(sender_name: &str, content: &str, correlation_user_id: Uuid) -> PushPayload {
        PushPayload {
            title: format!("New message from {}", sender_name),
            body: content.to_string(),
            data: PushData {
                user_id: correlation_user_id,
            },
        }
    }

    /// Send one notification. No retries: the push service owns redelivery.
    pub async fn notify(
        &self,
        subscription: &PushSubscription,
        sender_name: &str,
        content: &str,
        correlation_user_id: Uuid,
    ) -> PushOutcome {
        let Some(sender) = self.sender.as_ref() else {
            debug!("push disabled, skipping notification to {}", subscription.endpoint);
            return PushOutcome::Disabled;
        };

        let payload = Self::payload(sender_name, content, correlation_user_id);
        let result = match serde_json::to_vec(&payload) {
            Ok(bytes) => sender.send(subscription, &bytes).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                debug!("push notification sent to {}", subscription.endpoint);
                PushOutcome::Sent
            }
            Err(e) => {
                warn!(
                    "push delivery failed for {} (from {}): {}",
                    subscription.endpoint, correlation_user_id, e
                );
                PushOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use courier_types::push::PushKeys;
    use std::sync::Mutex;

    /// Records every submission; fails them all when `fail` is set.
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub(crate) sent: Mutex<Vec<(String, PushPayload)>>,
        pub(crate) fail: bool,
    }

    impl RecordingSender {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn sent(&self) -> Vec<(String, PushPayload)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl PushSender for RecordingSender {
        fn send<'a>(&'a self, subscription: &'a PushSubscription, payload: &'a [u8]) -> PushFuture<'a> {
            Box::pin(async move {
                let payload: PushPayload = serde_json::from_slice(payload)?;
                self.sent
                    .lock()
                    .unwrap()
                    .push((subscription.endpoint.clone(), payload));
                if self.fail {
                    return Err(PushError::Transport("410 Gone".into()));
                }
                Ok(())
            })
        }
    }

    pub(crate) fn subscription(endpoint: &str) -> PushSubscription {
        PushSubscription {
            endpoint: endpoint.to_string(),
            keys: PushKeys {
                p256dh: "p256".to_string(),
                auth: "auth".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn notify_builds_payload_from_sender_and_content() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = NotificationDispatcher::new(sender.clone());
        let from = Uuid::new_v4();

        let outcome = dispatcher
            .notify(&subscription("https://push.example/1"), "bob", "hello", from)
            .await;

        assert_eq!(outcome, PushOutcome::Sent);
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://push.example/1");
        assert!(sent[0].1.title.contains("bob"));
        assert_eq!(sent[0].1.body, "hello");
        assert_eq!(sent[0].1.data.user_id, from);
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed_without_retry() {
        let sender = Arc::new(RecordingSender::failing());
        let dispatcher = NotificationDispatcher::new(sender.clone());

        let outcome = dispatcher
            .notify(&subscription("https://push.example/1"), "bob", "hi", Uuid::new_v4())
            .await;

        assert_eq!(outcome, PushOutcome::Failed);
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn disabled_dispatcher_attempts_nothing() {
        let dispatcher = NotificationDispatcher::disabled();
        assert!(!dispatcher.is_enabled());

        let outcome = dispatcher
            .notify(&subscription("https://push.example/1"), "bob", "hi", Uuid::new_v4())
            .await;

        assert_eq!(outcome, PushOutcome::Disabled);
    }

    #[test]
    fn payload_serializes_to_service_worker_shape() {
        let from = Uuid::new_v4();
        let json = serde_json::to_value(NotificationDispatcher::payload("bob", "yo", from)).unwrap();

        assert_eq!(json["title"], "New message from bob");
        assert_eq!(json["body"], "yo");
        assert_eq!(json["data"]["userId"], from.to_string());
    }

    #[test]
    fn vapid_status_requires_all_three_parts() {
        assert!(matches!(
            VapidConfigStatus::from_parts(None, None, None),
            VapidConfigStatus::Missing
        ));
        assert!(matches!(
            VapidConfigStatus::from_parts(Some("k".into()), None, None),
            VapidConfigStatus::Incomplete
        ));
        assert!(matches!(
            VapidConfigStatus::from_parts(
                Some("k".into()),
                Some("p".into()),
                Some("mailto:ops@example.com".into())
            ),
            VapidConfigStatus::Ready(_)
        ));
    }
}
