use std::sync::Arc;

use chrono::Utc;
use external_services::{
    GatewayPaymentStatus, PaymentCustomer, PaymentGateway, PaymentInitiation, PaymentSession,
};
use ticket_domain::{BookingId, BookingStatus, Payment, PaymentId, PaymentStatus};
use ticket_store::{StoreError, TicketStore};
use tracing::{info, warn};

use crate::context::Actor;
use crate::error::ServiceError;

const PURCHASE_ORDER_NAME: &str = "Movie tickets";

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Where Khalti sends the customer after checkout.
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct KhaltiCheckout {
    pub booking_id: BookingId,
    /// Paisa, as the checkout page computed it.
    pub total_price: u64,
    pub website_url: String,
}

/// Query parameters Khalti appends to the return URL.
#[derive(Debug, Clone, Default)]
pub struct KhaltiCallback {
    pub pidx: String,
    pub purchase_order_id: Option<String>,
    pub status: Option<String>,
}

pub struct PaymentService {
    store: Arc<dyn TicketStore>,
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl PaymentService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    pub async fn initialize(
        &self,
        actor: &Actor,
        checkout: KhaltiCheckout,
    ) -> Result<PaymentSession, ServiceError> {
        let booking = self
            .store
            .get_booking(checkout.booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking not found"))?;
        if booking.user_id != actor.user_id {
            return Err(ServiceError::forbidden("You can only pay for your own bookings"));
        }
        if booking.status != BookingStatus::Pending {
            return Err(ServiceError::bad_request("Booking is not awaiting payment"));
        }
        let expected = booking.price.to_paisa()?;
        if checkout.total_price != expected {
            return Err(ServiceError::bad_request(format!(
                "Amount mismatch: expected {expected} paisa"
            )));
        }
        let website_url = checkout.website_url.trim().to_string();
        if website_url.is_empty() {
            return Err(ServiceError::bad_request("website_url is required"));
        }

        let customer_info = self
            .store
            .get_user(booking.user_id)
            .await?
            .map(|user| PaymentCustomer {
                name: user.username,
                email: user.email,
                phone: user.phone_number,
            });
        let session = self
            .gateway
            .initiate(&PaymentInitiation {
                return_url: self.settings.return_url.clone(),
                website_url,
                amount: expected,
                purchase_order_id: booking.id.to_string(),
                purchase_order_name: PURCHASE_ORDER_NAME.to_string(),
                customer_info,
            })
            .await?;

        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::new(),
            booking_id: booking.id,
            user_id: booking.user_id,
            pidx: session.pidx.clone(),
            amount_paisa: expected,
            status: PaymentStatus::Initiated,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_payment(&payment).await?;
        info!(booking_id = %booking.id, pidx = %payment.pidx, amount = expected, "payment initiated");
        Ok(session)
    }

    /// The gateway's lookup is authoritative; the callback's own status is
    /// only logged. Completing twice returns the stored payment.
    pub async fn complete(
        &self,
        actor: &Actor,
        callback: KhaltiCallback,
    ) -> Result<Payment, ServiceError> {
        let pidx = callback.pidx.trim();
        if pidx.is_empty() {
            return Err(ServiceError::bad_request("pidx is required"));
        }
        let payment = self.load(pidx).await?;
        actor.require_owner_or_admin(payment.user_id)?;
        if let Some(order_id) = callback.purchase_order_id.as_deref() {
            if order_id != payment.booking_id.to_string() {
                return Err(ServiceError::bad_request(
                    "Payment does not belong to this booking",
                ));
            }
        }
        match payment.status {
            PaymentStatus::Completed => return Ok(payment),
            PaymentStatus::Failed => return Err(ServiceError::bad_request("Payment failed")),
            PaymentStatus::Initiated => {}
        }

        let lookup = self.gateway.lookup(pidx).await?;
        info!(
            pidx,
            gateway_status = ?lookup.status,
            callback_status = callback.status.as_deref().unwrap_or("-"),
            "payment lookup"
        );
        match lookup.status {
            GatewayPaymentStatus::Completed if lookup.total_amount == payment.amount_paisa => {
                match self
                    .store
                    .complete_payment(pidx, lookup.transaction_id.clone())
                    .await
                {
                    Ok(completed) => {
                        info!(pidx, booking_id = %completed.booking_id, "payment completed");
                        Ok(completed)
                    }
                    Err(StoreError::StatusMismatch { .. }) => {
                        self.settle_race(pidx, lookup.transaction_id).await
                    }
                    Err(err) => Err(err.into()),
                }
            }
            GatewayPaymentStatus::Completed => {
                warn!(
                    pidx,
                    expected = payment.amount_paisa,
                    paid = lookup.total_amount,
                    "payment amount mismatch"
                );
                self.mark_failed(pidx).await?;
                Err(ServiceError::bad_request("Payment amount does not match booking"))
            }
            GatewayPaymentStatus::Pending | GatewayPaymentStatus::Initiated => Err(
                ServiceError::bad_request("Payment is still pending, please try again shortly"),
            ),
            other => {
                self.mark_failed(pidx).await?;
                Err(ServiceError::bad_request(format!(
                    "Payment was not completed ({})",
                    gateway_status_label(&other)
                )))
            }
        }
    }

    /// Another request finished first, or the booking left `pending`. Money
    /// the gateway already captured is recorded even when the booking is gone.
    async fn settle_race(
        &self,
        pidx: &str,
        transaction_id: Option<String>,
    ) -> Result<Payment, ServiceError> {
        let mut current = self.load(pidx).await?;
        if current.status == PaymentStatus::Initiated {
            current = match self
                .store
                .complete_unbooked_payment(pidx, transaction_id)
                .await
            {
                Ok(recorded) => {
                    warn!(
                        pidx,
                        booking_id = %recorded.booking_id,
                        amount = recorded.amount_paisa,
                        "payment captured for a booking that is no longer pending, refund due"
                    );
                    recorded
                }
                Err(StoreError::StatusMismatch { .. }) => self.load(pidx).await?,
                Err(err) => return Err(err.into()),
            };
        }
        if current.status != PaymentStatus::Completed {
            return Err(ServiceError::bad_request("Payment failed"));
        }
        let booking = self
            .store
            .get_booking(current.booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking not found"))?;
        if booking.status == BookingStatus::Confirmed {
            return Ok(current);
        }
        Err(ServiceError::Conflict(
            "Booking is no longer awaiting payment; the payment was recorded for refund"
                .to_string(),
        ))
    }

    async fn mark_failed(&self, pidx: &str) -> Result<(), ServiceError> {
        match self.store.fail_payment(pidx).await {
            Ok(_) | Err(StoreError::StatusMismatch { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load(&self, pidx: &str) -> Result<Payment, ServiceError> {
        self.store
            .get_payment_by_pidx(pidx)
            .await?
            .ok_or_else(|| ServiceError::not_found("Payment not found"))
    }
}

fn gateway_status_label(status: &GatewayPaymentStatus) -> &str {
    match status {
        GatewayPaymentStatus::Completed => "Completed",
        GatewayPaymentStatus::Pending => "Pending",
        GatewayPaymentStatus::Initiated => "Initiated",
        GatewayPaymentStatus::Refunded => "Refunded",
        GatewayPaymentStatus::Expired => "Expired",
        GatewayPaymentStatus::UserCanceled => "User canceled",
        GatewayPaymentStatus::Other(raw) => raw,
    }
}

#[cfg(test)]
mod tests {
    use external_services::PaymentLookup;
    use ticket_domain::{Booking, UserId};
    use ticket_store::{BookingRepository, PaymentRepository};

    use super::*;
    use crate::bookings::NewBooking;
    use crate::test_support::{Fixture, fixture, seeded_show};

    async fn pending_booking(fx: &Fixture, owner: &Actor) -> Booking {
        let (show, seats) = seeded_show(fx, 450, 2).await;
        fx.services
            .bookings
            .create_booking(
                owner,
                NewBooking {
                    show_id: show.id,
                    seat_ids: vec![seats[0].id, seats[1].id],
                    price: None,
                },
            )
            .await
            .expect("booking")
    }

    fn checkout(booking: &Booking, total_price: u64) -> KhaltiCheckout {
        KhaltiCheckout {
            booking_id: booking.id,
            total_price,
            website_url: "http://localhost:3000".to_string(),
        }
    }

    fn callback(pidx: &str) -> KhaltiCallback {
        KhaltiCallback {
            pidx: pidx.to_string(),
            ..KhaltiCallback::default()
        }
    }

    #[tokio::test]
    async fn initialize_checks_owner_and_amount() {
        let fx = fixture();
        let owner = Actor::user(UserId::new());
        let booking = pending_booking(&fx, &owner).await;

        assert!(matches!(
            fx.services
                .payments
                .initialize(&Actor::user(UserId::new()), checkout(&booking, 90_000))
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            fx.services
                .payments
                .initialize(&owner, checkout(&booking, 900))
                .await,
            Err(ServiceError::BadRequest(_))
        ));

        let session = fx
            .services
            .payments
            .initialize(&owner, checkout(&booking, 90_000))
            .await
            .expect("initialize");
        let stored = fx
            .store
            .get_payment_by_pidx(&session.pidx)
            .await
            .expect("lookup")
            .expect("payment");
        assert_eq!(stored.amount_paisa, 90_000);
        assert_eq!(stored.status, PaymentStatus::Initiated);
    }

    #[tokio::test]
    async fn completed_lookup_confirms_booking_and_is_idempotent() {
        let fx = fixture();
        let owner = Actor::user(UserId::new());
        let booking = pending_booking(&fx, &owner).await;
        let session = fx
            .services
            .payments
            .initialize(&owner, checkout(&booking, 90_000))
            .await
            .expect("initialize");

        let payment = fx
            .services
            .payments
            .complete(&owner, callback(&session.pidx))
            .await
            .expect("complete");
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.transaction_id.is_some());
        let stored = fx.store.get_booking(booking.id).await.expect("get").expect("booking");
        assert_eq!(stored.status, BookingStatus::Confirmed);

        let again = fx
            .services
            .payments
            .complete(&owner, callback(&session.pidx))
            .await
            .expect("idempotent");
        assert_eq!(again.id, payment.id);
    }

    #[tokio::test]
    async fn canceled_lookup_fails_payment_and_keeps_booking_pending() {
        let fx = fixture();
        let owner = Actor::user(UserId::new());
        let booking = pending_booking(&fx, &owner).await;
        let session = fx
            .services
            .payments
            .initialize(&owner, checkout(&booking, 90_000))
            .await
            .expect("initialize");
        fx.gateway
            .set_lookup(PaymentLookup {
                pidx: session.pidx.clone(),
                status: GatewayPaymentStatus::UserCanceled,
                total_amount: 90_000,
                transaction_id: None,
            })
            .expect("override");

        let err = fx
            .services
            .payments
            .complete(&owner, callback(&session.pidx))
            .await
            .expect_err("canceled");
        assert_eq!(err.to_string(), "Payment was not completed (User canceled)");
        let stored = fx
            .store
            .get_payment_by_pidx(&session.pidx)
            .await
            .expect("lookup")
            .expect("payment");
        assert_eq!(stored.status, PaymentStatus::Failed);
        let booking = fx.store.get_booking(booking.id).await.expect("get").expect("booking");
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn pending_lookup_leaves_payment_open() {
        let fx = fixture();
        let owner = Actor::user(UserId::new());
        let booking = pending_booking(&fx, &owner).await;
        let session = fx
            .services
            .payments
            .initialize(&owner, checkout(&booking, 90_000))
            .await
            .expect("initialize");
        fx.gateway
            .set_lookup(PaymentLookup {
                pidx: session.pidx.clone(),
                status: GatewayPaymentStatus::Pending,
                total_amount: 90_000,
                transaction_id: None,
            })
            .expect("override");
        assert!(
            fx.services
                .payments
                .complete(&owner, callback(&session.pidx))
                .await
                .is_err()
        );
        let stored = fx
            .store
            .get_payment_by_pidx(&session.pidx)
            .await
            .expect("lookup")
            .expect("payment");
        assert_eq!(stored.status, PaymentStatus::Initiated);
    }

    #[tokio::test]
    async fn short_payment_is_rejected() {
        let fx = fixture();
        let owner = Actor::user(UserId::new());
        let booking = pending_booking(&fx, &owner).await;
        let session = fx
            .services
            .payments
            .initialize(&owner, checkout(&booking, 90_000))
            .await
            .expect("initialize");
        fx.gateway
            .set_lookup(PaymentLookup {
                pidx: session.pidx.clone(),
                status: GatewayPaymentStatus::Completed,
                total_amount: 100,
                transaction_id: Some("txn".to_string()),
            })
            .expect("override");
        assert!(matches!(
            fx.services
                .payments
                .complete(&owner, callback(&session.pidx))
                .await,
            Err(ServiceError::BadRequest(_))
        ));
        let booking = fx.store.get_booking(booking.id).await.expect("get").expect("booking");
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn payment_for_a_cancelled_booking_is_recorded_not_confirmed() {
        let fx = fixture();
        let owner = Actor::user(UserId::new());
        let booking = pending_booking(&fx, &owner).await;
        let session = fx
            .services
            .payments
            .initialize(&owner, checkout(&booking, 90_000))
            .await
            .expect("initialize");
        fx.services
            .bookings
            .change_status(&owner, booking.id, BookingStatus::Cancelled)
            .await
            .expect("cancel");
        assert!(matches!(
            fx.services
                .payments
                .complete(&owner, callback(&session.pidx))
                .await,
            Err(ServiceError::Conflict(_))
        ));

        let payment = fx
            .store
            .get_payment_by_pidx(&session.pidx)
            .await
            .expect("lookup")
            .expect("payment");
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.transaction_id.is_some());
        let stored = fx.store.get_booking(booking.id).await.expect("get").expect("booking");
        assert_eq!(stored.status, BookingStatus::Cancelled);
    }
}
