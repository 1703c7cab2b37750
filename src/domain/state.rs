use serde::{Deserialize, Serialize};
use std::fmt;

/// Vault lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultStatus {
    /// Identity reserved, derived accounts not created yet
    Uninitialized,
    /// Accepting deposits, withdrawals and position adjustments
    Active,
    /// Active, with cap enforcement permanently removed
    LimitsDropped,
}

impl VaultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaultStatus::Uninitialized => "UNINITIALIZED",
            VaultStatus::Active => "ACTIVE",
            VaultStatus::LimitsDropped => "LIMITS_DROPPED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: VaultStatus) -> bool {
        use VaultStatus::*;

        matches!(
            (self, target),
            (Uninitialized, Active) | (Active, LimitsDropped)
        )
    }

    /// Deposits, withdrawals, rebalances and position adjustments are allowed
    pub fn is_operational(&self) -> bool {
        matches!(self, VaultStatus::Active | VaultStatus::LimitsDropped)
    }

    /// Limits may still be (re)configured
    pub fn accepts_limits(&self) -> bool {
        matches!(self, VaultStatus::Active)
    }
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for VaultStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "UNINITIALIZED" => Ok(VaultStatus::Uninitialized),
            "ACTIVE" => Ok(VaultStatus::Active),
            "LIMITS_DROPPED" => Ok(VaultStatus::LimitsDropped),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: VaultStatus,
    pub to: VaultStatus,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: VaultStatus, to: VaultStatus, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use VaultStatus::*;

        assert!(Uninitialized.can_transition_to(Active));
        assert!(Active.can_transition_to(LimitsDropped));

        assert!(!Uninitialized.can_transition_to(LimitsDropped));
        assert!(!LimitsDropped.can_transition_to(Active));
        assert!(!Active.can_transition_to(Uninitialized));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(VaultStatus::try_from("ACTIVE").unwrap(), VaultStatus::Active);
        assert_eq!(
            VaultStatus::try_from("limits_dropped").unwrap(),
            VaultStatus::LimitsDropped
        );
        assert!(VaultStatus::try_from("CLOSED").is_err());
    }

    #[test]
    fn test_operational_states() {
        assert!(!VaultStatus::Uninitialized.is_operational());
        assert!(VaultStatus::Active.is_operational());
        assert!(VaultStatus::LimitsDropped.is_operational());

        assert!(VaultStatus::Active.accepts_limits());
        assert!(!VaultStatus::LimitsDropped.accepts_limits());
    }
}
