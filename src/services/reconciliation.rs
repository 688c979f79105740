//! The reconciliation engine.
//!
//! Two independent request contexts race to confirm the same order: the
//! browser redirect back from hosted checkout, and the processor's signed
//! webhook. Both funnel through the status-gated conditional update in
//! [`crate::services::payment_status`], so the payment is applied exactly
//! once no matter which path lands first.

use std::sync::Arc;

use chrono::Utc;
use http::{HeaderMap, StatusCode};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryOrder, Set};
use tracing::{error, info, instrument, warn};

use crate::config::SmartpayConfig;
use crate::entities::{order, order_item, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{CheckoutLifecycle, Event, EventSender};
use crate::services::payment_status;
use crate::smartpay::client::SmartpayClient;
use crate::smartpay::session::build_checkout_session_request;
use crate::smartpay::types::{
    RefundRequest, SessionOrder, WebhookEventBody, REFUND_REASON_REQUESTED_BY_CUSTOMER,
    REMOTE_STATUS_SUCCEEDED,
};

pub const HEADER_SIGNATURE: &str = "smartpay-signature";
pub const HEADER_SIGNATURE_TIMESTAMP: &str = "smartpay-signature-timestamp";
pub const HEADER_SUBSCRIPTION_ID: &str = "smartpay-subscription-id";
pub const HEADER_EVENT_ID: &str = "smartpay-event-id";

/// Result of creating (or re-using) a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    /// Hosted checkout URL the customer is redirected to.
    pub checkout_url: String,
}

/// Result of a redirect confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// This call applied the payment.
    Confirmed,
    /// The webhook (or an earlier redirect) already settled the order.
    AlreadySettled,
}

/// Terminal state of webhook processing. Nothing past the webhook boundary
/// ever throws; every rejection is an HTTP status, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payment applied by this delivery.
    Confirmed,
    /// Signature did not verify. Answered 200 so the processor stops
    /// retrying; nothing about the failure is disclosed.
    InvalidSignature,
    /// Remote or local status does not authorize settlement (including a
    /// delivery retried after the order already settled). Safe no-op.
    StatusMismatch,
    /// One of the four required headers is absent.
    MissingHeaders,
    /// Body unparsable or missing the remote order id.
    MalformedPayload,
    /// Webhook id / signing secret not configured locally.
    NotConfigured,
    /// Delivered subscription id is not ours.
    SubscriptionMismatch,
    /// Reference missing or unmapped, local order unknown, or the stored
    /// session does not match the event's order.
    OrderNotFound,
    /// Internal failure; nothing was mutated.
    Unexpected,
}

impl WebhookOutcome {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Confirmed | Self::InvalidSignature | Self::StatusMismatch => StatusCode::OK,
            Self::MissingHeaders | Self::MalformedPayload => StatusCode::BAD_REQUEST,
            Self::NotConfigured | Self::SubscriptionMismatch | Self::OrderNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    client: SmartpayClient,
    settings: SmartpayConfig,
    lifecycle: Arc<dyn CheckoutLifecycle>,
    event_sender: EventSender,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        client: SmartpayClient,
        settings: SmartpayConfig,
        lifecycle: Arc<dyn CheckoutLifecycle>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            client,
            settings,
            lifecycle,
            event_sender,
        }
    }

    /// Creates the checkout session for an order awaiting payment.
    ///
    /// At most one session ever exists per order: a stored session id is
    /// re-used instead of creating a duplicate. Failure leaves the order
    /// `Enabled`; the caller decides whether to roll the workflow back via
    /// [`Self::cancel`].
    #[instrument(skip(self))]
    pub async fn create_session(&self, order_id: i64) -> Result<CreatedSession, ServiceError> {
        let order = self.load_order(order_id).await?;
        if order.payment_status != PaymentStatus::Enabled {
            warn!(order_id, status = %order.payment_status, "session requested for an order not awaiting payment");
            return Err(ServiceError::InvalidStatus(
                "order is not awaiting payment".into(),
            ));
        }

        if let Some(existing) = &order.checkout_session_id {
            info!(order_id, session_id = %existing, "re-using existing checkout session");
            return Ok(CreatedSession {
                session_id: existing.clone(),
                checkout_url: self.login_url(existing),
            });
        }

        let items = order
            .find_related(order_item::Entity)
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?;
        let request = build_checkout_session_request(
            &order,
            &items,
            &self.settings.success_url,
            &self.settings.cancel_url,
        );

        let created = self
            .client
            .create_checkout_session(&request)
            .await
            .map_err(|err| {
                error!(order_id, error = %err, "failed to create checkout session");
                err
            })?;

        let mut active: order::ActiveModel = order.into();
        active.checkout_session_id = Set(Some(created.id.clone()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;

        info!(order_id, session_id = %created.id, "checkout session created");
        let _ = self
            .event_sender
            .send(Event::CheckoutSessionCreated {
                order_id,
                session_id: created.id.clone(),
            })
            .await;

        let checkout_url = created
            .url
            .clone()
            .unwrap_or_else(|| self.login_url(&created.id));
        Ok(CreatedSession {
            session_id: created.id,
            checkout_url,
        })
    }

    /// Confirms payment when the browser lands back on the completion URL.
    #[instrument(skip(self))]
    pub async fn confirm_redirect(&self, order_id: i64) -> Result<RedirectOutcome, ServiceError> {
        let order = self.load_order(order_id).await?;

        match order.payment_status {
            // The webhook may have settled the order first; the customer
            // still needs the completed-checkout bookkeeping, but nothing
            // is re-verified and no second mail goes out.
            PaymentStatus::ActualSales | PaymentStatus::ProvisionalSales => {
                info!(order_id, "redirect for an already-settled order");
                self.lifecycle.resume_completed(&order).await;
                return Ok(RedirectOutcome::AlreadySettled);
            }
            PaymentStatus::Enabled => {}
            status => {
                warn!(order_id, %status, "redirect for an order not awaiting payment");
                return Err(ServiceError::InvalidStatus(
                    "order is not awaiting payment".into(),
                ));
            }
        }

        self.fetch_succeeded_session(&order).await?;

        let applied = payment_status::transition(
            &*self.db,
            order_id,
            PaymentStatus::Enabled,
            PaymentStatus::ActualSales,
        )
        .await?;
        if !applied {
            info!(order_id, "order settled concurrently during redirect confirmation");
            let order = self.load_order(order_id).await?;
            self.lifecycle.resume_completed(&order).await;
            return Ok(RedirectOutcome::AlreadySettled);
        }

        let order = self.load_order(order_id).await?;
        self.lifecycle.payment_completed(&order).await;
        let _ = self
            .event_sender
            .send(Event::PaymentConfirmed { order_id })
            .await;
        info!(order_id, "payment confirmed via redirect");
        Ok(RedirectOutcome::Confirmed)
    }

    /// Processes an inbound webhook delivery. Never propagates a fault past
    /// this boundary; the returned outcome maps 1:1 to an HTTP status.
    #[instrument(skip_all)]
    pub async fn confirm_webhook(&self, headers: &HeaderMap, raw_body: &[u8]) -> WebhookOutcome {
        match self.process_webhook(headers, raw_body).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "unexpected error during webhook processing");
                WebhookOutcome::Unexpected
            }
        }
    }

    async fn process_webhook(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        let (Some(webhook_id), Some(signing_secret)) = (
            self.settings.webhook_id.as_deref(),
            self.settings.webhook_signing_secret.as_deref(),
        ) else {
            warn!("webhook received but no webhook id / signing secret is configured");
            return Ok(WebhookOutcome::NotConfigured);
        };

        // Cheap checks first: all four headers must be present and the
        // subscription must be ours before any signature work or remote call.
        let signature = header_str(headers, HEADER_SIGNATURE);
        let timestamp = header_str(headers, HEADER_SIGNATURE_TIMESTAMP);
        let subscription_id = header_str(headers, HEADER_SUBSCRIPTION_ID);
        let event_id = header_str(headers, HEADER_EVENT_ID);
        let (Some(signature), Some(timestamp), Some(subscription_id), Some(event_id)) =
            (signature, timestamp, subscription_id, event_id)
        else {
            warn!("webhook rejected: missing required headers");
            return Ok(WebhookOutcome::MissingHeaders);
        };

        if subscription_id != webhook_id {
            warn!(subscription_id, "webhook rejected: subscription id mismatch");
            return Ok(WebhookOutcome::SubscriptionMismatch);
        }

        if !crate::smartpay::signature::verify(signing_secret, signature, timestamp, raw_body) {
            warn!(event_id, "webhook rejected: signature verification failed");
            return Ok(WebhookOutcome::InvalidSignature);
        }

        let Ok(body) = serde_json::from_slice::<WebhookEventBody>(raw_body) else {
            warn!(event_id, "webhook rejected: malformed payload");
            return Ok(WebhookOutcome::MalformedPayload);
        };
        let remote_order_id = body.event_data.data.id;

        let remote_order = self.client.get_order(&remote_order_id).await?;

        let Some(reference) = remote_order.reference.filter(|r| !r.is_empty()) else {
            warn!(event_id, %remote_order_id, "webhook rejected: remote order carries no reference");
            return Ok(WebhookOutcome::OrderNotFound);
        };
        if remote_order.status != REMOTE_STATUS_SUCCEEDED {
            warn!(event_id, %remote_order_id, remote_status = %remote_order.status, "webhook ignored: remote order has not succeeded");
            return Ok(WebhookOutcome::StatusMismatch);
        }

        let Ok(order_id) = reference.parse::<i64>() else {
            warn!(event_id, %reference, "webhook rejected: reference is not a local order id");
            return Ok(WebhookOutcome::OrderNotFound);
        };
        let Some(order) = order::Entity::find_by_id(order_id).one(&*self.db).await? else {
            warn!(event_id, order_id, "webhook rejected: local order not found");
            return Ok(WebhookOutcome::OrderNotFound);
        };

        // Stricter than the redirect path: anything but Enabled (including
        // already-settled retries) is a no-op, never a double apply.
        if order.payment_status != PaymentStatus::Enabled {
            info!(event_id, order_id, status = %order.payment_status, "webhook ignored: order is not awaiting payment");
            return Ok(WebhookOutcome::StatusMismatch);
        }

        // Cross-check: the order's own stored session must point at the
        // same remote order as the event, or the event is forged/replayed
        // against the wrong order.
        let Some(session_id) = order.checkout_session_id.as_deref() else {
            warn!(event_id, order_id, "webhook rejected: order has no stored checkout session");
            return Ok(WebhookOutcome::OrderNotFound);
        };
        let session = self.client.get_checkout_session_expanded(session_id).await?;
        let session_matches = session
            .order
            .as_ref()
            .is_some_and(|remote| remote.id == remote_order_id);
        if !session_matches {
            warn!(event_id, order_id, session_id, %remote_order_id, "webhook rejected: event order does not match stored session");
            return Ok(WebhookOutcome::OrderNotFound);
        }

        let applied = payment_status::transition(
            &*self.db,
            order_id,
            PaymentStatus::Enabled,
            PaymentStatus::ActualSales,
        )
        .await?;
        if !applied {
            info!(event_id, order_id, "order settled concurrently during webhook processing");
            return Ok(WebhookOutcome::StatusMismatch);
        }

        let order = self.load_order(order_id).await?;
        self.lifecycle.payment_completed(&order).await;
        let _ = self
            .event_sender
            .send(Event::PaymentConfirmed { order_id })
            .await;
        info!(event_id, order_id, "payment confirmed via webhook");
        Ok(WebhookOutcome::Confirmed)
    }

    /// Compensation hook invoked by the order workflow on cancellation.
    ///
    /// Returns the surrounding workflow status to `processing` and triggers
    /// the refund path; refund failure never blocks the cancellation.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: i64) -> Result<(), ServiceError> {
        let order = self.load_order(order_id).await?;
        info!(order_id, "cancelling order");

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set("processing".to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;

        self.refund_on_cancel(&order).await;

        let _ = self
            .event_sender
            .send(Event::OrderCancelled { order_id })
            .await;
        Ok(())
    }

    /// Refunds a settled order. A silent no-op from the caller's
    /// perspective: every skip and failure is logged, none propagates.
    pub async fn refund_on_cancel(&self, order: &order::Model) {
        if let Err(err) = self.try_refund(order).await {
            error!(order_id = order.id, error = %err, "refund failed");
        }
    }

    async fn try_refund(&self, order: &order::Model) -> Result<(), ServiceError> {
        let Some(session_id) = order.checkout_session_id.as_deref() else {
            info!(order_id = order.id, "skipping refund: no checkout session recorded");
            return Ok(());
        };
        if !order.payment_status.is_settled() {
            info!(order_id = order.id, status = %order.payment_status, "skipping refund: payment status is not refundable");
            return Ok(());
        }

        let session = self.client.get_checkout_session_expanded(session_id).await?;
        let Some(remote) = session.order else {
            warn!(order_id = order.id, session_id, "skipping refund: checkout session has no expanded order");
            return Ok(());
        };
        if remote.status != REMOTE_STATUS_SUCCEEDED {
            warn!(order_id = order.id, remote_status = %remote.status, "skipping refund: remote order has not succeeded");
            return Ok(());
        }
        let Some(payment) = remote.payments.first() else {
            warn!(order_id = order.id, "skipping refund: remote order carries no payment");
            return Ok(());
        };

        let request = RefundRequest {
            amount: remote.amount,
            currency: remote.currency.clone(),
            payment: payment.id.clone(),
            reason: REFUND_REASON_REQUESTED_BY_CUSTOMER.into(),
            reference: order.id.to_string(),
        };
        let refund = self.client.create_refund(&request).await?;
        info!(order_id = order.id, refund_id = %refund.id, "order refunded");

        let applied = payment_status::transition(
            &*self.db,
            order.id,
            order.payment_status,
            PaymentStatus::Cancel,
        )
        .await?;
        if !applied {
            // The remote refund went through; the ambiguity is reported,
            // not retried.
            warn!(order_id = order.id, "refund applied remotely but local status changed concurrently");
        }

        let _ = self
            .event_sender
            .send(Event::PaymentRefunded {
                order_id: order.id,
                refund_id: refund.id,
            })
            .await;
        Ok(())
    }

    async fn load_order(&self, order_id: i64) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                warn!(order_id, "order not found");
                ServiceError::NotFound("order not found".into())
            })
    }

    /// Fetches the stored session with full expansion and requires a
    /// succeeded remote order. All failures collapse into the same generic
    /// not-found error so payment detail never leaks to the customer.
    async fn fetch_succeeded_session(
        &self,
        order: &order::Model,
    ) -> Result<SessionOrder, ServiceError> {
        let Some(session_id) = order.checkout_session_id.as_deref() else {
            warn!(order_id = order.id, "order has no stored checkout session");
            return Err(ServiceError::NotFound("order not found".into()));
        };

        let session = self
            .client
            .get_checkout_session_expanded(session_id)
            .await
            .map_err(|err| {
                error!(order_id = order.id, session_id, error = %err, "failed to fetch checkout session");
                ServiceError::NotFound("order not found".into())
            })?;

        let Some(remote) = session.order else {
            warn!(order_id = order.id, session_id, "checkout session has no expanded order");
            return Err(ServiceError::NotFound("order not found".into()));
        };
        if remote.status != REMOTE_STATUS_SUCCEEDED {
            warn!(order_id = order.id, session_id, remote_status = %remote.status, "checkout session order has not succeeded");
            return Err(ServiceError::NotFound("order not found".into()));
        }
        Ok(remote)
    }

    fn login_url(&self, session_id: &str) -> String {
        format!(
            "{}/login?session-id={}",
            self.settings.checkout_url.trim_end_matches('/'),
            session_id
        )
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
