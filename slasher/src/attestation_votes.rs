use anyhow::Result;
use database::Database;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use types::primitives::{Epoch, ValidatorIndex, H256};

const EPOCH_SIZE: usize = size_of::<Epoch>();
const VALIDATOR_INDEX_SIZE: usize = size_of::<ValidatorIndex>();
const VOTE_KEY_LENGTH: usize = EPOCH_SIZE + VALIDATOR_INDEX_SIZE;

// TargetEpoch,ValidatorIndex -> AttestationRecord
type VoteKey = [u8; VOTE_KEY_LENGTH];

/// Compact evidence of the first vote seen from a validator for a target
/// epoch. The full attestation is kept separately, deduplicated by signing
/// root.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct AttestationRecord {
    pub signing_root: H256,
    pub source: Epoch,
}

#[derive(Constructor)]
pub struct AttestationVotes {
    db: Database,
}

impl AttestationVotes {
    fn key(target_epoch: Epoch, validator_index: ValidatorIndex) -> VoteKey {
        let mut key = [0; VOTE_KEY_LENGTH];
        key[..EPOCH_SIZE].copy_from_slice(&target_epoch.to_be_bytes());
        key[EPOCH_SIZE..].copy_from_slice(&validator_index.to_be_bytes());
        key
    }

    pub fn find(
        &self,
        validator_index: ValidatorIndex,
        target_epoch: Epoch,
    ) -> Result<Option<AttestationRecord>> {
        let bytes = self.db.get(Self::key(target_epoch, validator_index))?;

        if let Some(bytes) = bytes {
            return Ok(Some(bincode::deserialize(&bytes)?));
        }

        Ok(None)
    }

    /// Writes all records in one atomic batch.
    pub fn insert_batch(
        &self,
        records: impl IntoIterator<Item = (ValidatorIndex, Epoch, AttestationRecord)>,
    ) -> Result<()> {
        let pairs = records
            .into_iter()
            .map(|(validator_index, target_epoch, record)| {
                Ok((
                    Self::key(target_epoch, validator_index),
                    bincode::serialize(&record)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.db.put_batch(pairs)
    }

    pub fn cleanup(&self, current_epoch: Epoch, epochs_to_keep: u64) -> Result<()> {
        let cutoff_epoch = current_epoch.saturating_sub(epochs_to_keep);

        let first_key = Self::key(0, 0);
        let cutoff_key = Self::key(cutoff_epoch, 0);

        self.db.delete_range(&first_key..&cutoff_key)
    }
}
