use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::SLOTS_PER_EPOCH;

/// Chain-level timing variables. Detection parameters live with the detector.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    pub slot_duration: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainConfig {
    #[must_use]
    pub const fn mainnet() -> Self {
        Self {
            slot_duration: Duration::from_secs(12),
        }
    }

    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            slot_duration: Duration::from_secs(6),
        }
    }

    #[must_use]
    pub fn epoch_duration(&self) -> Duration {
        let slots_per_epoch =
            u32::try_from(SLOTS_PER_EPOCH).expect("number of slots per epoch fits in u32");

        self.slot_duration.saturating_mul(slots_per_epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_duration_spans_all_slots_of_an_epoch() {
        assert_eq!(
            ChainConfig::mainnet().epoch_duration(),
            Duration::from_secs(384),
        );
        assert_eq!(
            ChainConfig::minimal().epoch_duration(),
            Duration::from_secs(192),
        );
    }
}
