use paygate::domain::callback::CallbackOutcome;
use paygate::domain::delivery::{delivery_event_id, retry_backoff};
use paygate::domain::money::{Amount, Currency};
use paygate::domain::payment::PaymentStatus;
use paygate::domain::refund::RefundStatus;
use proptest::prelude::*;
use uuid::Uuid;

fn arb_payment_status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Succeeded),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Canceled),
    ]
}

fn arb_refund_status() -> impl Strategy<Value = RefundStatus> {
    prop_oneof![
        Just(RefundStatus::Pending),
        Just(RefundStatus::Succeeded),
        Just(RefundStatus::Failed),
        Just(RefundStatus::Canceled),
    ]
}

fn arb_outcome() -> impl Strategy<Value = CallbackOutcome> {
    prop_oneof![
        Just(CallbackOutcome::Succeeded),
        Just(CallbackOutcome::Failed),
        Just(CallbackOutcome::Canceled),
        Just(CallbackOutcome::Expired),
        Just(CallbackOutcome::Pending),
        Just(CallbackOutcome::RefundSucceeded),
        Just(CallbackOutcome::RefundFailed),
        Just(CallbackOutcome::RefundPending),
        Just(CallbackOutcome::RefundCanceled),
    ]
}

proptest! {
    /// Terminal payment states reject every outgoing edge.
    #[test]
    fn terminal_payment_states_are_sticky(target in arb_payment_status()) {
        use PaymentStatus::*;
        for terminal in [Succeeded, Failed, Canceled] {
            prop_assert!(!terminal.can_transition_to(&target));
        }
    }

    /// Any random callback sequence applied through the transition table
    /// moves a payment at most once: every reachable target is terminal.
    #[test]
    fn random_walk_transitions_at_most_once(
        steps in prop::collection::vec(arb_outcome(), 1..30)
    ) {
        let mut current = PaymentStatus::Pending;
        let mut transitions = 0u32;
        for outcome in &steps {
            if let Some(next) = outcome.payment_status() {
                if current != next && current.can_transition_to(&next) {
                    current = next;
                    transitions += 1;
                }
            }
        }
        prop_assert!(transitions <= 1, "got {transitions} transitions in walk: {steps:?}");
    }

    /// Every outcome is exactly one of: payment-mapped or refund-mapped.
    #[test]
    fn outcomes_partition_into_payment_and_refund(outcome in arb_outcome()) {
        prop_assert_eq!(outcome.is_refund(), outcome.refund_status().is_some());
        prop_assert_eq!(!outcome.is_refund(), outcome.payment_status().is_some());
    }

    /// as_str → try_from roundtrip is identity for any outcome.
    #[test]
    fn outcome_roundtrip(outcome in arb_outcome()) {
        let roundtripped = CallbackOutcome::try_from(outcome.as_str()).unwrap();
        prop_assert_eq!(roundtripped, outcome);
    }

    /// Terminal refund states reject every change, and holds_funds matches
    /// the cap rule exactly.
    #[test]
    fn refund_status_tables(status in arb_refund_status()) {
        use RefundStatus::*;
        prop_assert_eq!(status.is_terminal(), !matches!(status, Pending));
        prop_assert_eq!(status.holds_funds(), matches!(status, Pending | Succeeded));
    }

    /// Backoff delay is within [2^k, 1.2 * 2^k] for any jitter fraction.
    #[test]
    fn backoff_bounds(attempt in 0i32..=20, jitter in 0f64..1f64) {
        let delay = retry_backoff(attempt, jitter).as_secs_f64();
        let base = 2f64.powi(attempt);
        prop_assert!(delay >= base, "delay {delay} below base {base}");
        prop_assert!(delay <= base * 1.2, "delay {delay} above 1.2 * {base}");
    }

    /// The merchant idempotency key depends only on (entity, status).
    #[test]
    fn delivery_event_id_is_stable(bytes in any::<[u8; 16]>(), status in arb_payment_status()) {
        let id = Uuid::from_bytes(bytes);
        let a = delivery_event_id(id, status.as_str());
        let b = delivery_event_id(id, status.as_str());
        prop_assert_eq!(&a, &b);
        prop_assert!(a.starts_with(&id.to_string()));
    }

    /// Positive amounts survive the minor-units roundtrip; the rest are
    /// rejected at construction.
    #[test]
    fn amount_roundtrip(minor_units in any::<i64>()) {
        match Amount::new(minor_units) {
            Ok(amount) => {
                prop_assert!(minor_units > 0);
                prop_assert_eq!(amount.minor_units(), minor_units);
            }
            Err(_) => prop_assert!(minor_units <= 0),
        }
    }

    /// Currency as_str → try_from roundtrip.
    #[test]
    fn currency_roundtrip(idx in 0usize..9) {
        let currencies = [
            Currency::Usd, Currency::Cny, Currency::Hkd, Currency::Krw,
            Currency::Thb, Currency::Eur, Currency::Gbp, Currency::Jpy,
            Currency::Inr,
        ];
        let c = currencies[idx];
        prop_assert_eq!(Currency::try_from(c.as_str()).unwrap(), c);
    }
}

#[test]
fn expired_collapses_to_canceled() {
    assert_eq!(
        CallbackOutcome::Expired.payment_status(),
        Some(PaymentStatus::Canceled)
    );
}

#[test]
fn unknown_outcome_strings_rejected() {
    for s in ["completed", "unknown", "", "SUCCEEDED", "refund"] {
        assert!(CallbackOutcome::try_from(s).is_err(), "{s:?} must be rejected");
    }
}
