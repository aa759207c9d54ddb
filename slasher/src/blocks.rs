use anyhow::Result;
use database::Database;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use types::{
    containers::{BeaconBlockHeader, ProposerSlashing},
    misc,
    primitives::{Epoch, Slot, ValidatorIndex, H256},
};

use crate::{
    slasher_config::SlasherConfig,
    status::{ExplainedProposerSlashing, ProposerSlashingReason},
    wrappers::ProposalWrapper,
};

const SLOT_SIZE: usize = size_of::<Slot>();
const VALIDATOR_INDEX_SIZE: usize = size_of::<ValidatorIndex>();
const PROPOSAL_KEY_LENGTH: usize = SLOT_SIZE + VALIDATOR_INDEX_SIZE;

// Slot,ValidatorIndex -> ProposalRecord
type ProposalKey = [u8; PROPOSAL_KEY_LENGTH];

fn build_proposal_key(proposer_index: ValidatorIndex, slot: Slot) -> ProposalKey {
    let mut key = [0; PROPOSAL_KEY_LENGTH];
    key[..SLOT_SIZE].copy_from_slice(&slot.to_be_bytes());
    key[SLOT_SIZE..].copy_from_slice(&proposer_index.to_be_bytes());
    key
}

#[derive(PartialEq, Eq, Deserialize, Serialize)]
#[cfg_attr(test, derive(Debug))]
struct ProposalRecord {
    header: BeaconBlockHeader,
    signing_root: H256,
}

#[derive(Constructor)]
pub struct Blocks {
    config: SlasherConfig,
    blocks_db: Database,
}

impl Blocks {
    /// Detects two distinct signed headers at the same slot by the same
    /// proposer, within the batch and against stored records. The first
    /// header seen for a slot is recorded and kept.
    pub fn detect_batch(
        &self,
        batch: &[ProposalWrapper],
    ) -> Result<Vec<ExplainedProposerSlashing>> {
        let mut slashings = vec![];

        for wrapper in batch {
            if let Some(slashing) = self.find_slashing(wrapper)? {
                slashings.push(slashing);
            } else {
                self.update(wrapper)?;
            }
        }

        Ok(slashings)
    }

    pub fn cleanup(&self, current_epoch: Epoch) -> Result<()> {
        let epochs_to_keep = self.config.history_length;

        if epochs_to_keep >= current_epoch {
            return Ok(());
        }

        let cutoff_epoch = current_epoch - epochs_to_keep;
        let cutoff_slot = misc::compute_start_slot_at_epoch(cutoff_epoch);

        let first_key = build_proposal_key(0, 0);
        let cutoff_key = build_proposal_key(0, cutoff_slot);

        self.blocks_db.delete_range(&first_key..&cutoff_key)
    }

    fn find_slashing(&self, wrapper: &ProposalWrapper) -> Result<Option<ExplainedProposerSlashing>> {
        let proposer_index = wrapper.header.proposer_index;
        let slot = wrapper.header.slot;

        if let Some(existing) = self.find_proposal_record(proposer_index, slot)? {
            if existing.signing_root != wrapper.signing_root {
                // Canonical order puts the lower signing root first.
                let (header_1, header_2) = if existing.signing_root <= wrapper.signing_root {
                    (existing.header, wrapper.header.clone())
                } else {
                    (wrapper.header.clone(), existing.header)
                };

                let slashing = ProposerSlashing { header_1, header_2 };

                return Ok(Some(ExplainedProposerSlashing {
                    slashing,
                    reason: ProposerSlashingReason::DoubleProposal,
                }));
            }
        }

        Ok(None)
    }

    fn update(&self, wrapper: &ProposalWrapper) -> Result<()> {
        let key = build_proposal_key(wrapper.header.proposer_index, wrapper.header.slot);

        let record = ProposalRecord {
            header: wrapper.header.clone(),
            signing_root: wrapper.signing_root,
        };

        self.blocks_db.put(key, bincode::serialize(&record)?)
    }

    fn find_proposal_record(
        &self,
        proposer_index: ValidatorIndex,
        slot: Slot,
    ) -> Result<Option<ProposalRecord>> {
        let bytes = self.blocks_db.get(build_proposal_key(proposer_index, slot))?;

        if let Some(bytes) = bytes {
            return Ok(Some(bincode::deserialize(&bytes)?));
        }

        Ok(None)
    }
}
