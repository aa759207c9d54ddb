pub use crate::{
    attestations::Attestations,
    blocks::Blocks,
    counters::Counters,
    messages::SlasherToSink,
    slasher::{Databases, Slasher},
    slasher_config::SlasherConfig,
    status::{
        AttesterSlashingReason, ExplainedAttesterSlashing, ExplainedProposerSlashing,
        ProposerSlashingReason,
    },
    wrappers::{validate_attestation_integrity, AttestationWrapper, ProposalWrapper},
};

mod attestation_votes;
mod attestations;
mod blocks;
mod chunks;
mod counters;
mod indexed_attestations;
mod messages;
mod slasher;
mod slasher_config;
mod spans;
mod status;
mod wrappers;
