//! Authorization tracking and escalation.
//!
//! The [`AuthorizationGate`] reads the platform permission level and issues
//! at most one escalation request at a time. Operations consult it before
//! touching the location capability:
//!
//! ```text
//! NotDetermined ──request──► (prompt outstanding) ──change event──► WhenInUse / Always / Denied
//! WhenInUse ──request(Always)──► (prompt outstanding) ──change event──► Always / WhenInUse
//! Denied / Restricted ──► never re-prompted, dependent operations fail fast
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::platform::LocationSource;

/// Platform-granted permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationStatus {
    /// The user has not been asked yet.
    #[default]
    NotDetermined,
    /// Access is blocked by policy (parental controls, MDM).
    Restricted,
    /// The user refused access.
    Denied,
    /// Access while the app is in use.
    AuthorizedWhenInUse,
    /// Access at all times, required for region monitoring.
    AuthorizedAlways,
}

impl AuthorizationStatus {
    /// Returns true if the status refuses location access outright.
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Denied | Self::Restricted)
    }

    /// Returns true if some level of access has been granted.
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::AuthorizedWhenInUse | Self::AuthorizedAlways)
    }

    /// Returns true if this status satisfies the requested level.
    pub fn satisfies(&self, level: AuthorizationLevel) -> bool {
        match level {
            AuthorizationLevel::WhenInUse => self.is_authorized(),
            AuthorizationLevel::Always => *self == Self::AuthorizedAlways,
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDetermined => write!(f, "not determined"),
            Self::Restricted => write!(f, "restricted"),
            Self::Denied => write!(f, "denied"),
            Self::AuthorizedWhenInUse => write!(f, "when in use"),
            Self::AuthorizedAlways => write!(f, "always"),
        }
    }
}

/// Permission tier a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationLevel {
    /// Foreground access.
    #[default]
    WhenInUse,
    /// Background access.
    Always,
}

/// Result of an escalation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// The current status already satisfies the level.
    AlreadySufficient,
    /// A request was sent to the platform.
    Requested,
    /// A previous request is still unanswered; nothing was sent.
    Outstanding,
    /// The platform will not prompt again (denied, restricted or
    /// already answered for this level).
    Unavailable,
}

/// Tracks the authorization level and escalates it on demand.
///
/// The gate remembers the status observed when it last issued a request.
/// While the platform still reports that same status the request counts as
/// outstanding, so repeated calls do not re-prompt.
pub struct AuthorizationGate {
    source: Arc<dyn LocationSource>,
    outstanding: Mutex<Option<AuthorizationStatus>>,
}

impl AuthorizationGate {
    /// Create a gate over the given location source.
    pub fn new(source: Arc<dyn LocationSource>) -> Self {
        Self {
            source,
            outstanding: Mutex::new(None),
        }
    }

    /// Current platform authorization status.
    pub fn current_status(&self) -> AuthorizationStatus {
        self.source.authorization_status()
    }

    /// Returns true if `status` is enough for `level`.
    pub fn is_sufficient(status: AuthorizationStatus, level: AuthorizationLevel) -> bool {
        status.satisfies(level)
    }

    /// Returns true if an escalation request is awaiting an answer.
    pub fn is_outstanding(&self) -> bool {
        let current = self.current_status();
        let outstanding = self.outstanding.lock();
        *outstanding == Some(current)
    }

    /// Escalate to `level` if the current status is insufficient.
    pub fn request_authorization(&self, level: AuthorizationLevel) -> EscalationOutcome {
        let current = self.current_status();
        let mut outstanding = self.outstanding.lock();

        if Self::is_sufficient(current, level) {
            *outstanding = None;
            return EscalationOutcome::AlreadySufficient;
        }

        if *outstanding == Some(current) {
            return EscalationOutcome::Outstanding;
        }
        // The platform answered since the last request
        *outstanding = None;

        let can_prompt = match current {
            AuthorizationStatus::NotDetermined => true,
            AuthorizationStatus::AuthorizedWhenInUse => level == AuthorizationLevel::Always,
            _ => false,
        };
        if !can_prompt {
            debug!(status = %current, ?level, "Authorization escalation unavailable");
            return EscalationOutcome::Unavailable;
        }

        debug!(status = %current, ?level, "Requesting authorization");
        *outstanding = Some(current);
        self.source.request_authorization(level);
        EscalationOutcome::Requested
    }
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("status", &self.current_status())
            .field("outstanding", &*self.outstanding.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulated::SimulatedLocationSource;

    fn gate_with(status: AuthorizationStatus) -> (Arc<SimulatedLocationSource>, AuthorizationGate) {
        let source = Arc::new(SimulatedLocationSource::new());
        source.set_authorization(status);
        let gate = AuthorizationGate::new(source.clone());
        (source, gate)
    }

    #[test]
    fn test_satisfies() {
        use AuthorizationLevel::*;
        use AuthorizationStatus::*;

        assert!(AuthorizedWhenInUse.satisfies(WhenInUse));
        assert!(AuthorizedAlways.satisfies(WhenInUse));
        assert!(AuthorizedAlways.satisfies(Always));
        assert!(!AuthorizedWhenInUse.satisfies(Always));
        assert!(!NotDetermined.satisfies(WhenInUse));
        assert!(!Denied.satisfies(WhenInUse));
    }

    #[test]
    fn test_request_when_not_determined() {
        let (source, gate) = gate_with(AuthorizationStatus::NotDetermined);

        assert_eq!(
            gate.request_authorization(AuthorizationLevel::WhenInUse),
            EscalationOutcome::Requested
        );
        assert_eq!(
            source.authorization_requests(),
            vec![AuthorizationLevel::WhenInUse]
        );
        assert!(gate.is_outstanding());
    }

    #[test]
    fn test_second_request_is_noop_while_outstanding() {
        let (source, gate) = gate_with(AuthorizationStatus::NotDetermined);

        gate.request_authorization(AuthorizationLevel::WhenInUse);
        assert_eq!(
            gate.request_authorization(AuthorizationLevel::WhenInUse),
            EscalationOutcome::Outstanding
        );
        assert_eq!(source.authorization_requests().len(), 1);
    }

    #[test]
    fn test_sufficient_status_skips_request() {
        let (source, gate) = gate_with(AuthorizationStatus::AuthorizedAlways);

        assert_eq!(
            gate.request_authorization(AuthorizationLevel::Always),
            EscalationOutcome::AlreadySufficient
        );
        assert!(source.authorization_requests().is_empty());
    }

    #[test]
    fn test_denied_never_prompts() {
        let (source, gate) = gate_with(AuthorizationStatus::Denied);

        assert_eq!(
            gate.request_authorization(AuthorizationLevel::WhenInUse),
            EscalationOutcome::Unavailable
        );
        assert!(source.authorization_requests().is_empty());
    }

    #[test]
    fn test_escalate_when_in_use_to_always() {
        let (source, gate) = gate_with(AuthorizationStatus::AuthorizedWhenInUse);

        assert_eq!(
            gate.request_authorization(AuthorizationLevel::Always),
            EscalationOutcome::Requested
        );
        assert_eq!(
            source.authorization_requests(),
            vec![AuthorizationLevel::Always]
        );
    }

    #[test]
    fn test_outstanding_clears_after_answer() {
        let (source, gate) = gate_with(AuthorizationStatus::NotDetermined);

        gate.request_authorization(AuthorizationLevel::Always);
        source.set_authorization(AuthorizationStatus::AuthorizedWhenInUse);
        assert!(!gate.is_outstanding());

        // User answered "when in use"; asking for Always again may prompt once more
        assert_eq!(
            gate.request_authorization(AuthorizationLevel::Always),
            EscalationOutcome::Requested
        );
        assert_eq!(source.authorization_requests().len(), 2);
    }
}
