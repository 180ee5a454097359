use shared::Team;
use thiserror::Error;

/// Why an alliance operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllianceError {
    #[error("team {0} cannot ally with itself")]
    SelfAlliance(Team),
    #[error("the neutral team takes no part in alliances")]
    NeutralTeam,
    #[error("team {0} is already in an alliance")]
    AlreadyAllied(Team),
    #[error("no pending alliance request from team {from} to team {to}")]
    NoPendingRequest { from: Team, to: Team },
    #[error("team {0} is not allied with team {1}")]
    NotAllied(Team, Team),
}

/// A rejected inbound frame.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("frame of {0} bytes exceeds the limit")]
    Oversized(usize),
    #[error("malformed packet: {0}")]
    Decode(#[from] bincode::Error),
    #[error("rate limited")]
    RateLimited,
}

impl IngressError {
    /// Oversized and malformed frames count towards the disconnect threshold;
    /// rate-limited ones are only dropped.
    pub fn counts_as_invalid(&self) -> bool {
        !matches!(self, IngressError::RateLimited)
    }
}
