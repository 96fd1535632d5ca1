use crate::peer::state::NegotiationState;
use crate::peer::types::Role;
use crate::utils::random_id;
use chrono::{DateTime, Utc};

/// One negotiation between exactly two parties, owned by its negotiator.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub role: Role,
    pub state: NegotiationState,
    pub local_description_set: bool,
    pub remote_description_set: bool,
    /// Bumped on teardown so late engine events can be recognised and dropped
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    /// Set when the session first reaches `Connected`
    pub connected_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(role: Role) -> Self {
        let state = match role {
            Role::Initiator => NegotiationState::Idle,
            Role::Responder => NegotiationState::AwaitingOffer,
        };
        Self {
            id: random_id(),
            role,
            state,
            local_description_set: false,
            remote_description_set: false,
            generation: 0,
            started_at: Utc::now(),
            connected_at: None,
        }
    }

    /// Time from session start until now, in whole seconds
    pub fn age_secs(&self) -> i64 {
        Utc::now().timestamp() - self.started_at.timestamp()
    }

    /// Local candidates may be sent once our own description is applied.
    pub fn can_send_candidates(&self) -> bool {
        self.local_description_set
    }

    /// Remote candidates may be applied once the peer's description is applied.
    pub fn can_apply_candidates(&self) -> bool {
        self.remote_description_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_depends_on_role() {
        assert_eq!(Session::new(Role::Initiator).state, NegotiationState::Idle);
        assert_eq!(
            Session::new(Role::Responder).state,
            NegotiationState::AwaitingOffer
        );
    }

    #[test]
    fn gates_start_closed() {
        let session = Session::new(Role::Responder);
        assert!(!session.can_send_candidates());
        assert!(!session.can_apply_candidates());
        assert_eq!(session.generation, 0);
        assert!(session.connected_at.is_none());
        assert!(session.age_secs() >= 0);
    }
}
