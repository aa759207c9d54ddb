use anyhow::Result;
use database::Database;
use derive_more::Constructor;
use types::{
    containers::IndexedAttestation,
    primitives::{Epoch, H256},
};

const EPOCH_SIZE: usize = size_of::<Epoch>();
const H256_SIZE: usize = size_of::<H256>();
const INDEXED_ATTESTATION_KEY_LENGTH: usize = EPOCH_SIZE + H256_SIZE;

// TargetEpoch,SigningRoot -> IndexedAttestation
type IndexedAttestationKey = [u8; INDEXED_ATTESTATION_KEY_LENGTH];

/// Full attestations backing emitted slashings, deduplicated by signing root.
#[derive(Constructor)]
pub struct IndexedAttestations {
    db: Database,
}

impl IndexedAttestations {
    fn key(target_epoch: Epoch, signing_root: H256) -> IndexedAttestationKey {
        let mut key = [0; INDEXED_ATTESTATION_KEY_LENGTH];
        key[..EPOCH_SIZE].copy_from_slice(&target_epoch.to_be_bytes());
        key[EPOCH_SIZE..].copy_from_slice(signing_root.as_bytes());
        key
    }

    pub fn find(
        &self,
        signing_root: H256,
        target_epoch: Epoch,
    ) -> Result<Option<IndexedAttestation>> {
        let bytes = self.db.get(Self::key(target_epoch, signing_root))?;

        if let Some(bytes) = bytes {
            return Ok(Some(bincode::deserialize(&bytes)?));
        }

        Ok(None)
    }

    /// Writes all attestations in one atomic batch.
    pub fn insert_batch<'attestation>(
        &self,
        attestations: impl IntoIterator<Item = (H256, &'attestation IndexedAttestation)>,
    ) -> Result<()> {
        let pairs = attestations
            .into_iter()
            .map(|(signing_root, attestation)| {
                Ok((
                    Self::key(attestation.data.target, signing_root),
                    bincode::serialize(attestation)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.db.put_batch(pairs)
    }

    pub fn cleanup(&self, current_epoch: Epoch, epochs_to_keep: u64) -> Result<()> {
        let cutoff_epoch = current_epoch.saturating_sub(epochs_to_keep);

        let first_key = Self::key(0, H256::zero());
        let cutoff_key = Self::key(cutoff_epoch, H256::zero());

        self.db.delete_range(&first_key..&cutoff_key)
    }
}
