use anyhow::{ensure, Result};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use types::primitives::{Epoch, ValidatorIndex};

/// Detection parameters. Fixed at service start. Changing them invalidates
/// persisted span chunks.
#[derive(Clone, Copy, Debug, Derivative, Deserialize, Serialize)]
#[derivative(Default)]
#[serde(default, deny_unknown_fields)]
pub struct SlasherConfig {
    /// Epochs of span history retained per validator.
    #[derivative(Default(value = "4096"))]
    pub history_length: u64,
    /// Epochs per span chunk row.
    #[derivative(Default(value = "16"))]
    pub chunk_size: u64,
    /// Validators per span chunk column.
    #[derivative(Default(value = "256"))]
    pub validator_chunk_size: u64,
}

impl SlasherConfig {
    pub fn validate(self) -> Result<Self> {
        ensure!(
            self.chunk_size > 0 && self.validator_chunk_size > 0,
            "span chunk dimensions must be nonzero",
        );

        ensure!(
            self.history_length > 0 && self.history_length % self.chunk_size == 0,
            "history length must be a nonzero multiple of the chunk size",
        );

        Ok(self)
    }

    /// Smallest cell width in bytes that holds `history_length`.
    #[must_use]
    pub const fn cell_width(self) -> usize {
        match self.history_length {
            0..=0xff => 1,
            0x100..=0xffff => 2,
            0x1_0000..=0xffff_ffff => 4,
            _ => 8,
        }
    }

    #[must_use]
    pub const fn cells_per_chunk(self) -> usize {
        (self.chunk_size * self.validator_chunk_size) as usize
    }

    #[must_use]
    pub const fn chunk_count(self) -> u64 {
        self.history_length / self.chunk_size
    }

    #[must_use]
    pub const fn chunk_index(self, epoch: Epoch) -> u64 {
        (epoch / self.chunk_size) % self.chunk_count()
    }

    #[must_use]
    pub const fn validator_chunk_index(self, validator_index: ValidatorIndex) -> u64 {
        validator_index / self.validator_chunk_size
    }

    #[must_use]
    pub const fn epoch_offset(self, epoch: Epoch) -> usize {
        (epoch % self.chunk_size) as usize
    }

    #[must_use]
    pub const fn validator_offset(self, validator_index: ValidatorIndex) -> usize {
        (validator_index % self.validator_chunk_size) as usize
    }

    pub fn validator_indices_in_chunk(
        self,
        validator_chunk_index: u64,
    ) -> impl Iterator<Item = ValidatorIndex> {
        let first = validator_chunk_index * self.validator_chunk_size;
        first..first + self.validator_chunk_size
    }

    /// Lowest epoch whose span cells are still meaningful at `current_epoch`.
    /// Anything older has been overwritten by the wrapping history window.
    #[must_use]
    pub const fn lowest_tracked_epoch(self, current_epoch: Epoch) -> Epoch {
        current_epoch.saturating_sub(self.history_length - 1)
    }
}
