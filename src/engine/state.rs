use serde::{Deserialize, Serialize};

/// Lifecycle of one direction's synchronous stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamState {
    #[default]
    Unconfigured,
    Configured,
    Enabled,
    Disabled,
}

impl StreamState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: StreamState) -> bool {
        use StreamState::*;

        matches!(
            (self, target),
            // Configuration, including reconfiguration of an idle stream
            (Unconfigured, Configured) |
            (Configured, Configured) |
            (Disabled, Configured) |

            // Module enable/disable
            (Configured, Enabled) |
            (Enabled, Disabled) |
            (Disabled, Enabled) |

            // Teardown on close
            (Configured, Unconfigured) |
            (Disabled, Unconfigured) |
            (Unconfigured, Unconfigured)
        )
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, StreamState::Enabled)
    }

    /// Get human-readable state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unconfigured => "Unconfigured",
            Self::Configured => "Configured",
            Self::Enabled => "Enabled",
            Self::Disabled => "Disabled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StreamState::Unconfigured.can_transition_to(StreamState::Configured));
        assert!(StreamState::Configured.can_transition_to(StreamState::Enabled));
        assert!(StreamState::Disabled.can_transition_to(StreamState::Enabled));
    }

    #[test]
    fn test_enabled_cannot_be_reconfigured() {
        assert!(!StreamState::Enabled.can_transition_to(StreamState::Configured));
        assert!(!StreamState::Enabled.can_transition_to(StreamState::Unconfigured));
    }

    #[test]
    fn test_unconfigured_cannot_stream() {
        assert!(!StreamState::Unconfigured.can_transition_to(StreamState::Enabled));
        assert!(!StreamState::Unconfigured.is_streaming());
    }
}
