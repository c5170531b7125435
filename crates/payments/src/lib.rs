//! Per-job payment holds and their terminal settlement.
//!
//! [`PaymentEngine`] creates holds and administers out-of-band voids
//! directly against [`coordinator_store::Store`]; release and refund must
//! commit in the same atomic transaction as the job transition that
//! causes them, so this crate only builds the
//! [`coordinator_store::PaymentSettlement`] value: `coordinator-lifecycle`
//! passes it to `Store::transition_job` itself. After any terminal
//! settlement commits, the caller hands the resulting [`Payment`] back here
//! via [`PaymentEngine::record_event`] so it can be queued for
//! at-least-once delivery to a [`LedgerSink`].

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod error;

use std::sync::Arc;

use async_trait::async_trait;
use coordinator_clock::Clock;
use coordinator_primitives::{Amount, JobId, MinerId, Payment, PaymentEvent, PaymentId, PaymentState, SubmitterId, TimestampMs};
use coordinator_store::{PaymentSettlement, Store};

pub use error::{LedgerSinkError, PaymentError};

/// External, durable consumer of finalized payment events. Outside the
/// core's scope; the core only needs at-least-once delivery with dedup on
/// `payment_id`.
#[async_trait]
pub trait LedgerSink: Send + Sync + std::fmt::Debug {
    /// Records `event`. Returning `Err` leaves the event in the outbox for
    /// the next flush pass; the sink must tolerate redelivery of an event
    /// it already recorded.
    async fn record(&self, event: PaymentEvent) -> Result<(), LedgerSinkError>;
}

/// A [`LedgerSink`] that immediately acknowledges every event without
/// recording it anywhere, for local development and tests.
#[derive(Debug, Default)]
pub struct NullLedgerSink;

#[async_trait]
impl LedgerSink for NullLedgerSink {
    async fn record(&self, event: PaymentEvent) -> Result<(), LedgerSinkError> {
        tracing::debug!(payment_id = %event.payment_id, state = ?event.state, "ledger: recorded (null sink)");
        Ok(())
    }
}

/// Per-job monetary holds; the engine records obligations only, it does not
/// custody tokens itself.
#[derive(Debug)]
pub struct PaymentEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl PaymentEngine {
    /// Creates an engine backed by `store`, using `clock` for timestamps.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates a `HELD` payment for a newly submitted job.
    pub fn hold(
        &self,
        payment_id: PaymentId,
        job_id: JobId,
        payer_id: SubmitterId,
        amount: Amount,
    ) -> Result<Payment, PaymentError> {
        let now = self.clock.now_ms();
        let payment = Payment {
            id: payment_id,
            job_id,
            payer_id,
            payee_id: None,
            amount_held: amount,
            amount_settled: None,
            state: PaymentState::Held,
            created_ms: now,
            settled_ms: None,
        };
        self.store.create_payment(payment.clone())?;
        Ok(payment)
    }

    /// Builds the settlement releasing `amount` to `payee`, for bundling
    /// into the caller's `Store::transition_job` call.
    #[must_use]
    pub fn settlement_for_release(&self, payment_id: PaymentId, amount: Amount, payee: MinerId) -> PaymentSettlement {
        PaymentSettlement {
            payment_id,
            expected: PaymentState::Held,
            new: PaymentState::Released,
            settled_amount: Some(amount),
            payee_id: Some(payee),
        }
    }

    /// Builds the settlement refunding the full hold back to the
    /// submitter, for bundling into the caller's `Store::transition_job`
    /// call.
    #[must_use]
    pub fn settlement_for_refund(&self, payment_id: PaymentId) -> PaymentSettlement {
        PaymentSettlement {
            payment_id,
            expected: PaymentState::Held,
            new: PaymentState::Refunded,
            settled_amount: Some(Amount::ZERO),
            payee_id: None,
        }
    }

    /// Administratively voids a payment outside of any job transition.
    pub fn void(&self, payment_id: &PaymentId) -> Result<Payment, PaymentError> {
        let now = self.clock.now_ms();
        let payment = self.store.transition_payment(payment_id, PaymentState::Held, PaymentState::Voided, None, None, now)?;
        self.queue_event(&payment, now)?;
        Ok(payment)
    }

    /// Queues a `PaymentEvent` for `payment` in the at-least-once outbox.
    /// Called by `coordinator-lifecycle` right after a `Store::transition_job`
    /// call that settled a payment commits.
    pub fn queue_event(&self, payment: &Payment, at_ms: TimestampMs) -> Result<(), PaymentError> {
        let event = PaymentEvent {
            payment_id: payment.id.clone(),
            job_id: payment.job_id.clone(),
            state: payment.state,
            amount_settled: payment.amount_settled.unwrap_or(Amount::ZERO),
            payee_id: payment.payee_id.clone(),
            at_ms,
        };
        Ok(self.store.push_payment_event(event)?)
    }

    /// Drains up to `limit` queued events through `sink`, acknowledging
    /// (and thus removing) only the ones the sink accepted. Events the sink
    /// rejects remain for the next flush pass, giving at-least-once
    /// delivery.
    pub async fn flush_outbox(&self, sink: &dyn LedgerSink, limit: usize) -> Result<usize, PaymentError> {
        let events = self.store.peek_payment_events(limit)?;
        let mut delivered = 0;
        for event in events {
            let payment_id = event.payment_id.clone();
            match sink.record(event).await {
                Ok(()) => {
                    self.store.ack_payment_event(&payment_id)?;
                    delivered += 1;
                }
                Err(err) => {
                    tracing::warn!(payment_id = %payment_id, error = %err, "payments: ledger sink rejected event, retrying next pass");
                }
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use coordinator_clock::FakeClock;
    use coordinator_store::MemStore;
    use parking_lot::Mutex;

    use super::*;

    fn job_id() -> JobId {
        JobId::from("j1")
    }

    #[test]
    fn hold_creates_a_held_payment() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(100));
        let engine = PaymentEngine::new(store.clone(), clock);

        let payment = engine.hold(PaymentId::from("pay-1"), job_id(), SubmitterId::from("s1"), Amount(1_000)).unwrap();
        assert_eq!(payment.state, PaymentState::Held);
        assert_eq!(store.get_payment(&PaymentId::from("pay-1")).unwrap().unwrap().amount_held, Amount(1_000));
    }

    #[test]
    fn void_transitions_held_to_voided_and_queues_an_event() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(100));
        let engine = PaymentEngine::new(store.clone(), clock);
        engine.hold(PaymentId::from("pay-1"), job_id(), SubmitterId::from("s1"), Amount(1_000)).unwrap();

        let payment = engine.void(&PaymentId::from("pay-1")).unwrap();
        assert_eq!(payment.state, PaymentState::Voided);
        assert_eq!(store.peek_payment_events(10).unwrap().len(), 1);
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        accepted: Mutex<Vec<PaymentId>>,
        fail_first: Mutex<bool>,
    }

    #[async_trait]
    impl LedgerSink for RecordingSink {
        async fn record(&self, event: PaymentEvent) -> Result<(), LedgerSinkError> {
            let mut fail_first = self.fail_first.lock();
            if *fail_first {
                *fail_first = false;
                return Err(LedgerSinkError("transient".into()));
            }
            self.accepted.lock().push(event.payment_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn flush_outbox_retries_events_the_sink_rejects() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(100));
        let engine = PaymentEngine::new(store.clone(), clock);
        engine.hold(PaymentId::from("pay-1"), job_id(), SubmitterId::from("s1"), Amount(1_000)).unwrap();
        let payment = engine.void(&PaymentId::from("pay-1")).unwrap();
        let _ = payment;

        let sink = RecordingSink { accepted: Mutex::new(Vec::new()), fail_first: Mutex::new(true) };
        let delivered = engine.flush_outbox(&sink, 10).await.unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(store.peek_payment_events(10).unwrap().len(), 1);

        let delivered = engine.flush_outbox(&sink, 10).await.unwrap();
        assert_eq!(delivered, 1);
        assert!(store.peek_payment_events(10).unwrap().is_empty());
        assert_eq!(sink.accepted.lock().as_slice(), [PaymentId::from("pay-1")]);
    }
}
