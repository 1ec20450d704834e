use serde::{Deserialize, Serialize};

use super::types::Channel;

/// Physical line a trigger is routed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerSignal {
    J71_4,
    J51_1,
    MiniExp1,
    User(u8),
}

impl TriggerSignal {
    pub fn code(&self) -> u32 {
        match self {
            TriggerSignal::J71_4 => 0,
            TriggerSignal::J51_1 => 1,
            TriggerSignal::MiniExp1 => 2,
            TriggerSignal::User(n) => 128 + (*n as u32 & 0x7),
        }
    }
}

/// Role of a device on a shared trigger line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerRole {
    Disabled,
    Master,
    Slave,
}

/// Trigger configuration produced by `trigger_init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub channel: Channel,
    pub role: TriggerRole,
    pub signal: TriggerSignal,
}

/// Snapshot of a trigger's control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerState {
    pub is_armed: bool,
    pub has_fired: bool,
    pub fire_requested: bool,
}
