//! Challenge/response handshake as an explicit state machine.
//!
//! DESIGN
//! ======
//! `transition` is pure: given the current phase and an event it returns the
//! next phase and the effect the driver must perform next. `AuthSession` is
//! the only driver; it performs effects against the wallet and backend and
//! feeds their outcome back in as the next event.
//!
//! ```text
//! Unauthenticated --Start--> PendingNonce --NonceIssued--> PendingSignature
//! PendingSignature --Signed--> PendingVerification --Accepted--> Verified
//! PendingSignature --Declined--> Unauthenticated
//! PendingVerification --Rejected--> Unauthenticated
//! Verified | Unauthenticated --Revalidate--> Revalidating
//! Revalidating --StillValid--> Verified, --Revoked--> Unauthenticated
//! any pending phase --Failed--> Unauthenticated
//! any phase --Reset--> Unauthenticated
//! ```

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;

use crate::error::{AuthError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Unauthenticated,
    PendingNonce,
    PendingSignature,
    PendingVerification,
    Verified,
    Revalidating,
}

impl Phase {
    /// True while a handshake or revalidation is suspended on a collaborator.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingNonce | Self::PendingSignature | Self::PendingVerification | Self::Revalidating)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Begin a full handshake from a clean state.
    Start,
    NonceIssued,
    Signed,
    /// The user rejected or dismissed the signing prompt.
    Declined,
    Accepted,
    /// The backend answered 2xx but reported the signature as unverified.
    Rejected,
    /// A collaborator call failed mid-flight.
    Failed,
    Revalidate,
    StillValid,
    Revoked,
    Reset,
}

/// Work the driver performs after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RequestNonce,
    RequestSignature,
    SubmitSignature,
    RequestStatus,
    /// Drop the local record and the persisted copy.
    ClearSession,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub phase: Phase,
    pub effect: Effect,
}

const fn step(phase: Phase, effect: Effect) -> Step {
    Step { phase, effect }
}

/// Next phase and effect for `event` in `phase`.
///
/// # Errors
///
/// Returns `AuthError::InvalidTransition` for pairs with no edge.
pub fn transition(phase: Phase, event: Event) -> Result<Step> {
    use Effect as E;
    use Phase as P;

    let next = match (phase, event) {
        (_, Event::Reset) => step(P::Unauthenticated, E::ClearSession),
        (P::Unauthenticated, Event::Start) => step(P::PendingNonce, E::RequestNonce),
        (P::PendingNonce, Event::NonceIssued) => step(P::PendingSignature, E::RequestSignature),
        (P::PendingSignature, Event::Signed) => step(P::PendingVerification, E::SubmitSignature),
        (P::PendingSignature, Event::Declined) => step(P::Unauthenticated, E::ClearSession),
        (P::PendingVerification, Event::Accepted) => step(P::Verified, E::None),
        (P::PendingVerification, Event::Rejected) => step(P::Unauthenticated, E::None),
        (P::Unauthenticated | P::Verified, Event::Revalidate) => step(P::Revalidating, E::RequestStatus),
        (P::Revalidating, Event::StillValid) => step(P::Verified, E::None),
        (P::Revalidating, Event::Revoked) => step(P::Unauthenticated, E::ClearSession),
        (p, Event::Failed) if p.is_pending() => step(P::Unauthenticated, E::None),
        (phase, event) => return Err(AuthError::InvalidTransition { phase, event }),
    };
    Ok(next)
}
