use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging a warning instead of failing the caller when
    /// the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event delivery failed: {}", e);
        }
    }
}

// Define the various events that can occur during checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Session lifecycle events
    CheckoutSessionCreated {
        session_id: Uuid,
        restored_from_snapshot: bool,
    },
    CheckoutAbandoned(Uuid),
    AuthHandoffStarted(Uuid),

    // Cart events
    CartItemAdded {
        session_id: Uuid,
        service_id: String,
    },
    CartItemRemoved {
        session_id: Uuid,
        service_id: String,
    },
    CartCleared(Uuid),

    // Selection events
    AddressSelected(Uuid),
    ScheduleSelected(Uuid),
    PaymentMethodSelected {
        session_id: Uuid,
        method: String,
    },

    // Offer events
    OfferApplied {
        session_id: Uuid,
        code: String,
        discount_amount: Decimal,
    },
    OfferRevoked {
        session_id: Uuid,
        code: String,
    },

    // Step events
    StepChanged {
        session_id: Uuid,
        from: u8,
        to: u8,
    },

    // Submission events
    AppointmentSubmitted {
        session_id: Uuid,
        appointment_id: String,
    },
    PaymentSessionCreated {
        session_id: Uuid,
        appointment_id: String,
    },
    BookingConfirmed {
        session_id: Uuid,
        appointment_id: String,
        booking_reference: String,
    },
    BookingSubmissionFailed {
        session_id: Uuid,
        message: String,
    },
}

// Function to process incoming events. Downstream consumers (notifications,
// analytics) subscribe here; the default loop records structured telemetry.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::BookingConfirmed {
                session_id,
                appointment_id,
                booking_reference,
            } => {
                info!(
                    %session_id,
                    %appointment_id,
                    %booking_reference,
                    "booking confirmed"
                );
            }
            Event::PaymentSessionCreated {
                session_id,
                appointment_id,
            } => {
                info!(%session_id, %appointment_id, "payment session created");
            }
            Event::BookingSubmissionFailed {
                session_id,
                message,
            } => {
                warn!(%session_id, %message, "booking submission failed");
            }
            other => {
                info!(event = ?other, "checkout event");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::CartCleared(Uuid::nil()))
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::CartCleared(id)) => assert_eq!(id, Uuid::nil()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or return an error to the caller
        sender.send_or_log(Event::CartCleared(Uuid::nil())).await;
    }

    #[test]
    fn events_serialize_round_trip() {
        let event = Event::OfferApplied {
            session_id: Uuid::nil(),
            code: "SAVE10".to_string(),
            discount_amount: Decimal::new(2000, 2),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        match back {
            Event::OfferApplied { code, .. } => assert_eq!(code, "SAVE10"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
