use anyhow::{bail, Result};
use thiserror::Error;
use types::{
    containers::AttestationData,
    primitives::{Epoch, ValidatorIndex},
};

use crate::slasher_config::SlasherConfig;

/// Which span table a chunk belongs to.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ChunkKind {
    MinSpan,
    MaxSpan,
}

impl ChunkKind {
    /// Cell value meaning "no attestation constrains this epoch".
    #[must_use]
    pub const fn neutral_element(self, config: SlasherConfig) -> u64 {
        match self {
            Self::MinSpan => config.history_length,
            Self::MaxSpan => 0,
        }
    }

    pub const fn tag(self) -> u8 {
        match self {
            Self::MinSpan => 0,
            Self::MaxSpan => 1,
        }
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error(
        "chunk bytes do not match the configured shape \
         (kind: {kind:?}, expected: {expected} bytes, actual: {actual})"
    )]
    CorruptChunk {
        kind: ChunkKind,
        expected: usize,
        actual: usize,
    },
}

/// A dense `chunk_size × validator_chunk_size` tile of epoch distances.
///
/// A min span cell at `(epoch, validator)` holds the smallest `target - epoch`
/// over the validator's attestations with `source > epoch`. A max span cell
/// holds the largest such distance over attestations with `source < epoch`.
/// Together they answer surround queries against all prior attestations of a
/// validator in constant time.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpanChunk {
    kind: ChunkKind,
    cells: Vec<u64>,
}

impl SpanChunk {
    #[must_use]
    pub fn empty(kind: ChunkKind, config: SlasherConfig) -> Self {
        Self {
            kind,
            cells: vec![kind.neutral_element(config); config.cells_per_chunk()],
        }
    }

    pub fn from_bytes(kind: ChunkKind, config: SlasherConfig, bytes: &[u8]) -> Result<Self> {
        let width = config.cell_width();
        let expected = config.cells_per_chunk() * width;

        if bytes.len() != expected {
            bail!(Error::CorruptChunk {
                kind,
                expected,
                actual: bytes.len(),
            });
        }

        let cells = bytes
            .chunks_exact(width)
            .map(|cell| {
                let mut buffer = [0; 8];
                buffer[..width].copy_from_slice(cell);
                u64::from_le_bytes(buffer)
            })
            .collect();

        Ok(Self { kind, cells })
    }

    /// Cells are laid out row-major, epoch row outer, validator column inner,
    /// little-endian at the configured cell width.
    #[must_use]
    pub fn to_bytes(&self, config: SlasherConfig) -> Vec<u8> {
        let width = config.cell_width();
        let mut bytes = Vec::with_capacity(self.cells.len() * width);

        for cell in &self.cells {
            bytes.extend_from_slice(&cell.to_le_bytes()[..width]);
        }

        bytes
    }

    #[must_use]
    pub fn cell(&self, config: SlasherConfig, validator_index: ValidatorIndex, epoch: Epoch) -> u64 {
        self.cells[Self::cell_index(config, validator_index, epoch)]
    }

    pub fn set_cell(
        &mut self,
        config: SlasherConfig,
        validator_index: ValidatorIndex,
        epoch: Epoch,
        value: u64,
    ) {
        self.cells[Self::cell_index(config, validator_index, epoch)] = value;
    }

    /// Target epoch of an older attestation proven to conflict with `data` by
    /// the cell at `data.source`. The cell must be read before `data`'s own
    /// updates touch it so that the check sees the older target.
    #[must_use]
    pub fn conflicting_target(
        &self,
        config: SlasherConfig,
        validator_index: ValidatorIndex,
        data: &AttestationData,
    ) -> Option<Epoch> {
        let distance = self.cell(config, validator_index, data.source);
        let new_distance = data.target - data.source;

        let conflicting = match self.kind {
            // An older attestation with a later source and an earlier target
            // is surrounded by the incoming one.
            ChunkKind::MinSpan => distance < config.history_length && new_distance > distance,
            // An older attestation with an earlier source and a later target
            // surrounds the incoming one.
            ChunkKind::MaxSpan => distance > 0 && new_distance < distance,
        };

        conflicting.then_some(data.source + distance)
    }

    /// Applies the span update of an attestation with the given `target` to
    /// this chunk, starting at `start_epoch` (which must lie in this chunk)
    /// and walking away from the attestation's source. Stops at the first
    /// cell the update does not improve. Returns `true` when the walk should
    /// continue in the adjacent chunk.
    pub fn update(
        &mut self,
        config: SlasherConfig,
        validator_index: ValidatorIndex,
        start_epoch: Epoch,
        current_epoch: Epoch,
        target: Epoch,
    ) -> bool {
        let first_epoch_in_chunk = start_epoch - start_epoch % config.chunk_size;

        match self.kind {
            ChunkKind::MinSpan => {
                let lowest_epoch = config.lowest_tracked_epoch(current_epoch);
                let mut epoch = start_epoch;

                loop {
                    if epoch < lowest_epoch {
                        return false;
                    }

                    let new_distance = target - epoch;

                    if self.cell(config, validator_index, epoch) <= new_distance {
                        return false;
                    }

                    self.set_cell(config, validator_index, epoch, new_distance);

                    if epoch == first_epoch_in_chunk {
                        return epoch > lowest_epoch;
                    }

                    epoch -= 1;
                }
            }
            ChunkKind::MaxSpan => {
                let last_epoch_in_chunk = first_epoch_in_chunk + config.chunk_size - 1;
                let mut epoch = start_epoch;

                loop {
                    if epoch > current_epoch {
                        return false;
                    }

                    let new_distance = target.saturating_sub(epoch);

                    if self.cell(config, validator_index, epoch) >= new_distance {
                        return false;
                    }

                    self.set_cell(config, validator_index, epoch, new_distance);

                    if epoch == last_epoch_in_chunk {
                        return epoch < current_epoch;
                    }

                    epoch += 1;
                }
            }
        }
    }

    fn cell_index(config: SlasherConfig, validator_index: ValidatorIndex, epoch: Epoch) -> usize {
        let row_width = config.validator_chunk_size as usize;
        config.epoch_offset(epoch) * row_width + config.validator_offset(validator_index)
    }
}
