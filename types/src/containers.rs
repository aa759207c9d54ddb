use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    misc,
    primitives::{Epoch, Slot, ValidatorIndex, H256},
};

#[derive(Clone, PartialEq, Eq, Hash, Default, Debug, Deserialize, Serialize)]
pub struct AttestationData {
    pub beacon_block_root: H256,
    pub source: Epoch,
    pub target: Epoch,
}

impl AttestationData {
    /// Digest uniquely identifying the signed vote content.
    pub fn signing_root(&self) -> Result<H256> {
        Ok(hashing::hash(bincode::serialize(self)?))
    }
}

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
pub struct IndexedAttestation {
    pub attesting_indices: Vec<ValidatorIndex>,
    pub data: AttestationData,
}

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: H256,
    pub state_root: H256,
    pub body_root: H256,
}

impl BeaconBlockHeader {
    pub fn signing_root(&self) -> Result<H256> {
        Ok(hashing::hash(bincode::serialize(self)?))
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot(self.slot)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct AttesterSlashing {
    pub attestation_1: IndexedAttestation,
    pub attestation_2: IndexedAttestation,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ProposerSlashing {
    pub header_1: BeaconBlockHeader,
    pub header_2: BeaconBlockHeader,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attestation_signing_root_depends_on_every_field() -> Result<()> {
        let data = AttestationData {
            beacon_block_root: H256::zero(),
            source: 1,
            target: 2,
        };

        let differing_root = AttestationData {
            beacon_block_root: H256::repeat_byte(1),
            ..data.clone()
        };

        let differing_source = AttestationData {
            source: 0,
            ..data.clone()
        };

        assert_eq!(data.signing_root()?, data.clone().signing_root()?);
        assert_ne!(data.signing_root()?, differing_root.signing_root()?);
        assert_ne!(data.signing_root()?, differing_source.signing_root()?);

        Ok(())
    }

    #[test]
    fn header_signing_root_distinguishes_headers_at_the_same_slot() -> Result<()> {
        let header = BeaconBlockHeader {
            slot: 1,
            proposer_index: 2,
            ..BeaconBlockHeader::default()
        };

        let conflicting = BeaconBlockHeader {
            state_root: H256::repeat_byte(1),
            ..header.clone()
        };

        assert_ne!(header.signing_root()?, conflicting.signing_root()?);

        Ok(())
    }
}
