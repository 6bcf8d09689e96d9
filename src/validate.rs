use futures::future::BoxFuture;

use crate::peer::Peer;

/// The result a single `validate-peer` listener contributes (spec.md
/// §4.G "Validation signal accumulator").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accept,
    Reject,
    Pending,
}

/// A validator examines a freshly created peer (and whatever the caller's
/// closure captures — request headers, an auth token lookup, ...) and
/// returns an outcome asynchronously.
pub type Validator = Box<dyn Fn(&Peer) -> BoxFuture<'static, ValidationOutcome> + Send + Sync>;

/// An ordered list of validators, folded per spec.md §4.G: the first
/// REJECT short-circuits everything else; failing that, any PENDING wins;
/// an empty list or all-ACCEPT yields ACCEPT.
#[derive(Default)]
pub struct ValidationAccumulator {
    validators: Vec<Validator>,
}

impl ValidationAccumulator {
    pub fn new() -> Self {
        ValidationAccumulator { validators: Vec::new() }
    }

    pub fn register(&mut self, validator: Validator) {
        self.validators.push(validator);
    }

    pub async fn run(&self, peer: &Peer) -> ValidationOutcome {
        let mut saw_pending = false;
        for validator in &self.validators {
            match validator(peer).await {
                ValidationOutcome::Reject => return ValidationOutcome::Reject,
                ValidationOutcome::Pending => saw_pending = true,
                ValidationOutcome::Accept => {}
            }
        }
        if saw_pending {
            ValidationOutcome::Pending
        } else {
            ValidationOutcome::Accept
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BacklogPolicy;

    fn peer() -> Peer {
        Peer::new(16, BacklogPolicy::Reject)
    }

    fn outcome(o: ValidationOutcome) -> Validator {
        Box::new(move |_peer| Box::pin(async move { o }))
    }

    #[tokio::test]
    async fn empty_accumulator_accepts() {
        let acc = ValidationAccumulator::new();
        assert_eq!(acc.run(&peer()).await, ValidationOutcome::Accept);
    }

    #[tokio::test]
    async fn any_reject_short_circuits_to_reject() {
        let mut acc = ValidationAccumulator::new();
        acc.register(outcome(ValidationOutcome::Accept));
        acc.register(outcome(ValidationOutcome::Reject));
        acc.register(outcome(ValidationOutcome::Pending));
        assert_eq!(acc.run(&peer()).await, ValidationOutcome::Reject);
    }

    #[tokio::test]
    async fn pending_wins_over_accept_absent_reject() {
        let mut acc = ValidationAccumulator::new();
        acc.register(outcome(ValidationOutcome::Accept));
        acc.register(outcome(ValidationOutcome::Pending));
        assert_eq!(acc.run(&peer()).await, ValidationOutcome::Pending);
    }
}
