use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::error::CoreError;
use crate::models::PushSubscription;
use crate::repository::{PreferencesRepository, PushSubscriptionRepository, Repository};

/// Default timeout applied to a single push send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// The JSON payload delivered to the service worker.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The push service accepted the message
    Delivered,
    /// The subscription no longer exists and should be pruned
    Gone,
    /// Transient or unknown failure; the subscription is kept
    Failed,
}

/// Delivery seam for Web Push. Tests drive the dispatcher with a fake
/// implementation that counts attempts.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Whether sending is possible at all (VAPID material present).
    fn is_configured(&self) -> bool;

    /// Encrypt `payload` against the subscription's keys and POST it to the
    /// endpoint. Must not panic or propagate transport errors.
    async fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushOutcome;
}

/// VAPID key material; all three parts are required to enable sending.
#[derive(Debug, Clone)]
pub struct VapidKeys {
    /// URL-safe base64 public key, handed to browsers at subscribe time
    pub public_key: String,
    /// URL-safe base64 private key used to sign sends
    pub private_key: String,
    /// Contact address placed in the `sub` claim
    pub contact_email: String,
}

/// Production transport backed by the `web-push` crate.
///
/// Constructed with `None` the transport is disabled: `is_configured`
/// reports false and every delivery returns [`PushOutcome::Failed`] without
/// touching the network.
pub struct WebPushTransport {
    keys: Option<VapidKeys>,
    client: Option<IsahcWebPushClient>,
    timeout: Duration,
}

impl WebPushTransport {
    pub fn new(keys: Option<VapidKeys>) -> Self {
        let client = if keys.is_some() {
            IsahcWebPushClient::new().ok()
        } else {
            None
        };
        Self {
            keys,
            client,
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The VAPID public key browsers need when subscribing.
    pub fn public_key(&self) -> Option<&str> {
        self.keys.as_ref().map(|k| k.public_key.as_str())
    }

    async fn send(
        keys: &VapidKeys,
        client: &IsahcWebPushClient,
        subscription: &PushSubscription,
        body: &[u8],
    ) -> Result<(), WebPushError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh_key.clone(),
            subscription.auth_key.clone(),
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&keys.private_key, URL_SAFE_NO_PAD, &info)?;
        signature.add_claim("sub", format!("mailto:{}", keys.contact_email));

        let mut message = WebPushMessageBuilder::new(&info);
        message.set_payload(ContentEncoding::Aes128Gcm, body);
        message.set_vapid_signature(signature.build()?);

        client.send(message.build()?).await
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    fn is_configured(&self) -> bool {
        self.keys.is_some() && self.client.is_some()
    }

    async fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushOutcome {
        let (Some(keys), Some(client)) = (&self.keys, &self.client) else {
            tracing::debug!("push delivery requested but VAPID keys are not configured");
            return PushOutcome::Failed;
        };

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize push payload");
                return PushOutcome::Failed;
            }
        };

        match tokio::time::timeout(self.timeout, Self::send(keys, client, subscription, &body))
            .await
        {
            Ok(Ok(())) => PushOutcome::Delivered,
            Ok(Err(WebPushError::EndpointNotValid | WebPushError::EndpointNotFound)) => {
                PushOutcome::Gone
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "push delivery failed"
                );
                PushOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(subscription_id = %subscription.id, "push delivery timed out");
                PushOutcome::Failed
            }
        }
    }
}

/// Delivers `payload` to every push subscription of `user_id`, best-effort.
///
/// Success touches the subscription's `last_used_at`; a gone endpoint prunes
/// the subscription row; any other failure is logged and skipped. Nothing is
/// retried within the call and no transport error escapes it. Returns the
/// number of successful deliveries.
pub async fn fan_out<R>(
    repo: &R,
    transport: &dyn PushTransport,
    user_id: Uuid,
    payload: &PushPayload,
    now: DateTime<Utc>,
) -> Result<usize, CoreError>
where
    R: Repository + Sync + ?Sized,
{
    if !transport.is_configured() {
        tracing::trace!("push transport not configured; skipping fan-out");
        return Ok(0);
    }

    let prefs = repo.get_preferences(user_id).await?;
    if !prefs.push_enabled {
        return Ok(0);
    }

    let subscriptions = repo.list_subscriptions(user_id).await?;
    let mut delivered = 0;

    for subscription in subscriptions {
        match transport.deliver(&subscription, payload).await {
            PushOutcome::Delivered => {
                repo.touch_subscription(subscription.id, now).await?;
                delivered += 1;
            }
            PushOutcome::Gone => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    "subscription gone; removing"
                );
                repo.remove_subscription(subscription.id).await?;
            }
            PushOutcome::Failed => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    "push delivery failed; subscription kept"
                );
            }
        }
    }

    Ok(delivered)
}
