use anyhow::Result;
use types::{
    containers::{BeaconBlockHeader, IndexedAttestation},
    primitives::{Epoch, H256},
};

/// An ingested attestation together with its recomputed signing root.
/// The pipeline carries wrappers, not raw feed values.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AttestationWrapper {
    pub attestation: IndexedAttestation,
    pub signing_root: H256,
}

impl AttestationWrapper {
    pub fn new(attestation: IndexedAttestation) -> Result<Self> {
        let signing_root = attestation.data.signing_root()?;

        Ok(Self {
            attestation,
            signing_root,
        })
    }

    /// Deterministic processing order within a batch.
    #[must_use]
    pub fn sort_key(&self) -> (Epoch, Epoch, H256) {
        (
            self.attestation.data.source,
            self.attestation.data.target,
            self.signing_root,
        )
    }
}

/// An ingested block header together with its recomputed signing root.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProposalWrapper {
    pub header: BeaconBlockHeader,
    pub signing_root: H256,
}

impl ProposalWrapper {
    pub fn new(header: BeaconBlockHeader) -> Result<Self> {
        let signing_root = header.signing_root()?;

        Ok(Self {
            header,
            signing_root,
        })
    }
}

/// `true` when the attestation is structurally sound: nonempty, strictly
/// ascending attesting indices and a source strictly below the target.
/// Genesis attestations vote `(0, 0)`.
#[must_use]
pub fn validate_attestation_integrity(attestation: &IndexedAttestation) -> bool {
    let indices = &attestation.attesting_indices;
    let strictly_ascending = indices.windows(2).all(|pair| pair[0] < pair[1]);

    let source = attestation.data.source;
    let target = attestation.data.target;

    !indices.is_empty() && strictly_ascending && (source < target || (source == 0 && target == 0))
}
