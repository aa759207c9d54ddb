use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use database::Database;
use itertools::Itertools as _;
use log::warn;
use types::{
    containers::{AttesterSlashing, IndexedAttestation},
    primitives::{Epoch, ValidatorIndex, H256},
};

use crate::{
    attestation_votes::{AttestationRecord, AttestationVotes},
    chunks::ChunkKind,
    indexed_attestations::IndexedAttestations,
    slasher_config::SlasherConfig,
    spans::{SpanCache, SpanStore},
    status::{AttesterSlashingReason, ExplainedAttesterSlashing},
    wrappers::AttestationWrapper,
};

type VoteKey = (ValidatorIndex, Epoch);
type PairKey = (H256, H256);

pub struct Attestations {
    config: SlasherConfig,
    attestation_votes: AttestationVotes,
    indexed_attestations: IndexedAttestations,
    spans: SpanStore,
}

impl Attestations {
    #[must_use]
    pub fn new(
        config: SlasherConfig,
        votes_db: Database,
        attestations_db: Database,
        spans_db: Database,
        epochs_db: Database,
    ) -> Self {
        Self {
            config,
            attestation_votes: AttestationVotes::new(votes_db),
            indexed_attestations: IndexedAttestations::new(attestations_db),
            spans: SpanStore::new(config, spans_db, epochs_db),
        }
    }

    /// Runs one detection batch: double votes first, then surrounds over a
    /// shared chunk cache, then the atomic span flush. Slashings are returned
    /// only once the flush has succeeded. An error discards the whole batch.
    pub fn detect_batch(
        &self,
        mut batch: Vec<AttestationWrapper>,
        current_epoch: Epoch,
    ) -> Result<Vec<ExplainedAttesterSlashing>> {
        batch.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut slashings = vec![];
        let mut emitted_pairs = BTreeSet::new();

        let replayed = self.check_double_votes(&batch, &mut slashings, &mut emitted_pairs)?;

        self.check_surrounds(
            &batch,
            current_epoch,
            &replayed,
            &mut slashings,
            &mut emitted_pairs,
        )?;

        Ok(slashings)
    }

    pub fn cleanup(&self, current_epoch: Epoch) -> Result<()> {
        let epochs_to_keep = self.config.history_length;

        if epochs_to_keep >= current_epoch {
            return Ok(());
        }

        self.attestation_votes.cleanup(current_epoch, epochs_to_keep)?;
        self.indexed_attestations.cleanup(current_epoch, epochs_to_keep)?;

        Ok(())
    }

    /// Emits a double vote for every pair of attestations by one validator at
    /// the same target epoch with differing signing roots, both within the
    /// batch and against stored records. The first vote seen for a target is
    /// recorded and never overwritten; later conflicting votes only generate
    /// slashings. Returns the votes that were already recorded with the same
    /// signing root, so the surround pass does not report them a second time.
    fn check_double_votes(
        &self,
        batch: &[AttestationWrapper],
        slashings: &mut Vec<ExplainedAttesterSlashing>,
        emitted_pairs: &mut BTreeSet<PairKey>,
    ) -> Result<BTreeSet<VoteKey>> {
        let mut first_seen: BTreeMap<VoteKey, (H256, Option<IndexedAttestation>)> = BTreeMap::new();
        let mut replayed = BTreeSet::new();
        let mut new_votes = vec![];
        let mut new_attestations = BTreeMap::new();

        for wrapper in batch {
            let data = &wrapper.attestation.data;

            for &validator_index in &wrapper.attestation.attesting_indices {
                let vote_key = (validator_index, data.target);

                if let Some((first_root, first_attestation)) = first_seen.get(&vote_key) {
                    if *first_root != wrapper.signing_root {
                        if let Some(existing) = first_attestation {
                            push_slashing(
                                slashings,
                                emitted_pairs,
                                (existing.clone(), *first_root),
                                (wrapper.attestation.clone(), wrapper.signing_root),
                                AttesterSlashingReason::DoubleVote,
                            );
                        }
                    }

                    continue;
                }

                if let Some(record) = self.attestation_votes.find(validator_index, data.target)? {
                    let existing = self
                        .indexed_attestations
                        .find(record.signing_root, data.target)?;

                    if record.signing_root == wrapper.signing_root {
                        replayed.insert(vote_key);
                    } else if let Some(existing) = &existing {
                        push_slashing(
                            slashings,
                            emitted_pairs,
                            (existing.clone(), record.signing_root),
                            (wrapper.attestation.clone(), wrapper.signing_root),
                            AttesterSlashingReason::DoubleVote,
                        );
                    } else {
                        warn!(
                            "vote record has no matching attestation \
                             (validator: {validator_index}, target: {})",
                            data.target,
                        );
                    }

                    first_seen.insert(vote_key, (record.signing_root, existing));
                } else {
                    new_votes.push((
                        validator_index,
                        data.target,
                        AttestationRecord {
                            signing_root: wrapper.signing_root,
                            source: data.source,
                        },
                    ));

                    new_attestations.insert(wrapper.signing_root, &wrapper.attestation);

                    first_seen.insert(
                        vote_key,
                        (wrapper.signing_root, Some(wrapper.attestation.clone())),
                    );
                }
            }
        }

        // Records are persisted before the surround pass so that surround
        // proofs against attestations from the same batch resolve.
        self.indexed_attestations.insert_batch(new_attestations)?;
        self.attestation_votes.insert_batch(new_votes)?;

        Ok(replayed)
    }

    /// Drives the min-span and max-span walks per validator chunk and emits a
    /// surround slashing for every conflict proven by a pre-update cell.
    fn check_surrounds(
        &self,
        batch: &[AttestationWrapper],
        current_epoch: Epoch,
        replayed: &BTreeSet<VoteKey>,
        slashings: &mut Vec<ExplainedAttesterSlashing>,
        emitted_pairs: &mut BTreeSet<PairKey>,
    ) -> Result<()> {
        let mut grouped: BTreeMap<u64, Vec<&AttestationWrapper>> = BTreeMap::new();

        for wrapper in batch {
            let validator_chunk_indices = wrapper
                .attestation
                .attesting_indices
                .iter()
                .map(|&validator_index| self.config.validator_chunk_index(validator_index))
                .dedup();

            for validator_chunk_index in validator_chunk_indices {
                grouped
                    .entry(validator_chunk_index)
                    .or_default()
                    .push(wrapper);
            }
        }

        if grouped.is_empty() {
            return Ok(());
        }

        let mut cache = SpanCache::new(&self.spans);

        for (&validator_chunk_index, wrappers) in &grouped {
            self.apply_epoch_catch_up(&mut cache, validator_chunk_index, current_epoch)?;

            for kind in [ChunkKind::MinSpan, ChunkKind::MaxSpan] {
                for &wrapper in wrappers {
                    let validator_indices = wrapper
                        .attestation
                        .attesting_indices
                        .iter()
                        .copied()
                        .filter(|&validator_index| {
                            self.config.validator_chunk_index(validator_index)
                                == validator_chunk_index
                        });

                    for validator_index in validator_indices {
                        self.apply_attestation(
                            &mut cache,
                            kind,
                            validator_chunk_index,
                            validator_index,
                            wrapper,
                            current_epoch,
                            replayed,
                            slashings,
                            emitted_pairs,
                        )?;
                    }
                }
            }
        }

        cache.flush(current_epoch, grouped.keys().copied())
    }

    /// Span cells are a circular window of `history_length` epochs. Rows the
    /// advancing window is about to reuse are reset to the neutral element
    /// for every validator whose latest written epoch lags behind.
    fn apply_epoch_catch_up(
        &self,
        cache: &mut SpanCache,
        validator_chunk_index: u64,
        current_epoch: Epoch,
    ) -> Result<()> {
        for validator_index in self.config.validator_indices_in_chunk(validator_chunk_index) {
            let Some(latest) = self.spans.latest_written_epoch(validator_index)? else {
                continue;
            };

            if latest >= current_epoch {
                continue;
            }

            let first = latest
                .saturating_add(1)
                .max(self.config.lowest_tracked_epoch(current_epoch));

            for epoch in first..=current_epoch {
                for kind in [ChunkKind::MinSpan, ChunkKind::MaxSpan] {
                    let chunk_id = (kind, self.config.chunk_index(epoch), validator_chunk_index);
                    let neutral = kind.neutral_element(self.config);

                    cache
                        .chunk_mut(chunk_id)?
                        .set_cell(self.config, validator_index, epoch, neutral);
                }
            }
        }

        Ok(())
    }

    #[expect(clippy::too_many_arguments)]
    fn apply_attestation(
        &self,
        cache: &mut SpanCache,
        kind: ChunkKind,
        validator_chunk_index: u64,
        validator_index: ValidatorIndex,
        wrapper: &AttestationWrapper,
        current_epoch: Epoch,
        replayed: &BTreeSet<VoteKey>,
        slashings: &mut Vec<ExplainedAttesterSlashing>,
        emitted_pairs: &mut BTreeSet<PairKey>,
    ) -> Result<()> {
        let data = &wrapper.attestation.data;
        let lowest_epoch = self.config.lowest_tracked_epoch(current_epoch);

        // Sources below the tracked window cannot be checked against the
        // spans; history has wrapped. Replayed attestations were checked when
        // they were first recorded.
        let checkable =
            data.source >= lowest_epoch && !replayed.contains(&(validator_index, data.target));

        if checkable {
            let chunk_id = (kind, self.config.chunk_index(data.source), validator_chunk_index);

            let conflicting_target =
                cache
                    .chunk(chunk_id)?
                    .conflicting_target(self.config, validator_index, data);

            if let Some(conflicting_target) = conflicting_target {
                self.resolve_surround(
                    validator_index,
                    wrapper,
                    conflicting_target,
                    kind,
                    slashings,
                    emitted_pairs,
                )?;
            }
        }

        let mut start_epoch = match kind {
            ChunkKind::MinSpan => match data.source.checked_sub(1) {
                Some(epoch) => epoch,
                None => return Ok(()),
            },
            ChunkKind::MaxSpan => data.source.saturating_add(1).max(lowest_epoch),
        };

        loop {
            match kind {
                ChunkKind::MinSpan if start_epoch < lowest_epoch => break,
                ChunkKind::MaxSpan if start_epoch > current_epoch => break,
                _ => {}
            }

            let chunk_id = (kind, self.config.chunk_index(start_epoch), validator_chunk_index);

            let keep_going = cache.chunk_mut(chunk_id)?.update(
                self.config,
                validator_index,
                start_epoch,
                current_epoch,
                data.target,
            );

            if !keep_going {
                break;
            }

            let first_epoch_in_chunk = start_epoch - start_epoch % self.config.chunk_size;

            start_epoch = match kind {
                // The walk only asks to keep going when epochs remain below.
                ChunkKind::MinSpan => first_epoch_in_chunk - 1,
                ChunkKind::MaxSpan => first_epoch_in_chunk + self.config.chunk_size,
            };
        }

        Ok(())
    }

    /// Materializes the older counterpart of a proven conflict from the
    /// record tables and emits the slashing pair.
    fn resolve_surround(
        &self,
        validator_index: ValidatorIndex,
        wrapper: &AttestationWrapper,
        conflicting_target: Epoch,
        kind: ChunkKind,
        slashings: &mut Vec<ExplainedAttesterSlashing>,
        emitted_pairs: &mut BTreeSet<PairKey>,
    ) -> Result<()> {
        let Some(record) = self
            .attestation_votes
            .find(validator_index, conflicting_target)?
        else {
            warn!(
                "span table reports a conflict but the vote record is missing \
                 (validator: {validator_index}, target: {conflicting_target})",
            );
            return Ok(());
        };

        let Some(existing) = self
            .indexed_attestations
            .find(record.signing_root, conflicting_target)?
        else {
            warn!(
                "span table reports a conflict but the attestation is missing \
                 (validator: {validator_index}, target: {conflicting_target})",
            );
            return Ok(());
        };

        let reason = match kind {
            ChunkKind::MinSpan => AttesterSlashingReason::Surrounding,
            ChunkKind::MaxSpan => AttesterSlashingReason::Surrounded,
        };

        push_slashing(
            slashings,
            emitted_pairs,
            (existing, record.signing_root),
            (wrapper.attestation.clone(), wrapper.signing_root),
            reason,
        );

        Ok(())
    }
}

/// Emitted pairs are in canonical order, the attestation with the lower
/// `(target, source, signing_root)` first, and deduplicated by signing roots.
fn push_slashing(
    slashings: &mut Vec<ExplainedAttesterSlashing>,
    emitted_pairs: &mut BTreeSet<PairKey>,
    first: (IndexedAttestation, H256),
    second: (IndexedAttestation, H256),
    reason: AttesterSlashingReason,
) {
    let order_key = |(attestation, signing_root): &(IndexedAttestation, H256)| {
        (
            attestation.data.target,
            attestation.data.source,
            *signing_root,
        )
    };

    let ((attestation_1, root_1), (attestation_2, root_2)) =
        if order_key(&first) <= order_key(&second) {
            (first, second)
        } else {
            (second, first)
        };

    if emitted_pairs.insert((root_1, root_2)) {
        slashings.push(ExplainedAttesterSlashing {
            slashing: AttesterSlashing {
                attestation_1,
                attestation_2,
            },
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::containers::AttestationData;
    use unwrap_none::UnwrapNone as _;

    use crate::spans::build_chunk_key;

    use super::*;

    const CURRENT_EPOCH: Epoch = 14;

    fn build_config() -> SlasherConfig {
        SlasherConfig {
            history_length: 64,
            chunk_size: 16,
            validator_chunk_size: 1,
        }
    }

    fn build_attestations() -> Attestations {
        build_attestations_with_config(build_config())
    }

    fn build_attestations_with_config(config: SlasherConfig) -> Attestations {
        Attestations::new(
            config,
            Database::in_memory(),
            Database::in_memory(),
            Database::in_memory(),
            Database::in_memory(),
        )
    }

    fn build_attestation(source: Epoch, target: Epoch, root_byte: u8) -> AttestationWrapper {
        build_attestation_for(&[1], source, target, root_byte)
    }

    fn build_attestation_for(
        indices: &[ValidatorIndex],
        source: Epoch,
        target: Epoch,
        root_byte: u8,
    ) -> AttestationWrapper {
        AttestationWrapper {
            attestation: IndexedAttestation {
                attesting_indices: indices.to_vec(),
                data: AttestationData {
                    beacon_block_root: H256::repeat_byte(root_byte),
                    source,
                    target,
                },
            },
            signing_root: H256::repeat_byte(root_byte),
        }
    }

    //       S          T
    //                    S  T
    //   S     T
    // 1 2 3 4 5 6 7 8 9 10 11
    #[test]
    fn slashable_attestations_are_detected_against_history() -> Result<()> {
        let attestations = build_attestations();

        // valid attestation data
        let at_1 = build_attestation(2, 5, 1);
        let at_2 = build_attestation(10, 11, 2);
        let at_3 = build_attestation(4, 9, 3);

        // slashing violations
        let at_4 = build_attestation(1, 6, 4);
        let at_5 = build_attestation(1, 5, 5);
        let at_6 = build_attestation(7, 8, 6);

        let slashings = attestations.detect_batch(
            vec![at_1.clone(), at_2.clone(), at_3.clone()],
            CURRENT_EPOCH,
        )?;

        assert!(slashings.is_empty());

        // at_4 surrounds at_1
        let slashings = attestations.detect_batch(vec![at_4.clone()], CURRENT_EPOCH)?;

        assert_eq!(slashings.len(), 1);
        assert_eq!(slashings[0].reason, AttesterSlashingReason::Surrounding);
        assert_eq!(slashings[0].slashing.attestation_1, at_1.attestation);
        assert_eq!(slashings[0].slashing.attestation_2, at_4.attestation);

        // at_5 is a double vote against at_1
        let slashings = attestations.detect_batch(vec![at_5.clone()], CURRENT_EPOCH)?;

        assert_eq!(slashings.len(), 1);
        assert_eq!(slashings[0].reason, AttesterSlashingReason::DoubleVote);
        assert_eq!(slashings[0].slashing.attestation_1, at_5.attestation);
        assert_eq!(slashings[0].slashing.attestation_2, at_1.attestation);

        // at_6 is surrounded by at_3
        let slashings = attestations.detect_batch(vec![at_6.clone()], CURRENT_EPOCH)?;

        assert_eq!(slashings.len(), 1);
        assert_eq!(slashings[0].reason, AttesterSlashingReason::Surrounded);
        assert_eq!(slashings[0].slashing.attestation_1, at_6.attestation);
        assert_eq!(slashings[0].slashing.attestation_2, at_3.attestation);

        Ok(())
    }

    #[test]
    fn surrounding_vote_within_one_batch_is_reported_once() -> Result<()> {
        let attestations = build_attestations();

        let batch = vec![build_attestation(1, 2, 1), build_attestation(0, 3, 2)];
        let slashings = attestations.detect_batch(batch, 4)?;

        assert_eq!(slashings.len(), 1);

        // The attestation with the older target comes first.
        let slashing = &slashings[0].slashing;
        assert_eq!(slashing.attestation_1.data.source, 1);
        assert_eq!(slashing.attestation_1.data.target, 2);
        assert_eq!(slashing.attestation_2.data.source, 0);
        assert_eq!(slashing.attestation_2.data.target, 3);

        Ok(())
    }

    #[test]
    fn surrounded_vote_within_one_batch_is_reported_once() -> Result<()> {
        let attestations = build_attestations();

        let batch = vec![build_attestation(0, 3, 2), build_attestation(1, 2, 1)];
        let slashings = attestations.detect_batch(batch, 4)?;

        assert_eq!(slashings.len(), 1);

        let slashing = &slashings[0].slashing;
        assert_eq!(slashing.attestation_1.data.target, 2);
        assert_eq!(slashing.attestation_2.data.target, 3);

        Ok(())
    }

    #[test]
    fn surrounding_vote_with_a_distant_target_is_detected() -> Result<()> {
        let attestations = build_attestations_with_config(SlasherConfig {
            validator_chunk_size: 1,
            ..SlasherConfig::default()
        });

        let at_1 = build_attestation(50, 51, 1);
        let at_2 = build_attestation(0, 1000, 2);

        let slashings = attestations.detect_batch(vec![at_1.clone(), at_2.clone()], 1000)?;

        assert_eq!(slashings.len(), 1);
        assert_eq!(slashings[0].slashing.attestation_1, at_1.attestation);
        assert_eq!(slashings[0].slashing.attestation_2, at_2.attestation);

        Ok(())
    }

    #[test_case(&[(1, 2, 1), (2, 3, 2)]; "adjacent attestations")]
    #[test_case(&[(0, 3, 1), (2, 4, 2)]; "crossing attestations")]
    #[test_case(&[(1, 2, 1), (0, 2, 1)]; "same target with the same root")]
    #[test_case(&[(0, 2, 1), (0, 3, 2)]; "same source with a growing target")]
    #[test_case(&[(0, 3, 1), (0, 2, 2)]; "same source with a shrinking target")]
    #[test_case(&[(1, 2, 1), (1, 2, 1)]; "identical attestations")]
    #[test_case(&[(14, 16, 1), (15, 17, 2)]; "attestations spanning a chunk boundary")]
    fn non_slashable_batches_produce_no_slashings(batch: &[(Epoch, Epoch, u8)]) {
        let attestations = build_attestations();

        let batch = batch
            .iter()
            .map(|&(source, target, root_byte)| build_attestation(source, target, root_byte))
            .collect();

        let slashings = attestations
            .detect_batch(batch, 17)
            .expect("batch processing succeeds");

        assert!(slashings.is_empty());
    }

    #[test]
    fn double_vote_within_one_batch_is_reported() -> Result<()> {
        let attestations = build_attestations();

        let batch = vec![build_attestation(1, 2, 1), build_attestation(1, 2, 2)];
        let slashings = attestations.detect_batch(batch, 4)?;

        assert_eq!(slashings.len(), 1);
        assert_eq!(slashings[0].reason, AttesterSlashingReason::DoubleVote);

        // Canonical order puts the lower signing root first.
        let slashing = &slashings[0].slashing;
        assert_eq!(
            slashing.attestation_1.data.beacon_block_root,
            H256::repeat_byte(1),
        );
        assert_eq!(
            slashing.attestation_2.data.beacon_block_root,
            H256::repeat_byte(2),
        );

        Ok(())
    }

    #[test]
    fn double_vote_keeps_the_first_seen_vote_as_evidence() -> Result<()> {
        let attestations = build_attestations();

        assert!(attestations
            .detect_batch(vec![build_attestation(1, 2, 1)], 4)?
            .is_empty());

        let slashings = attestations.detect_batch(vec![build_attestation(1, 2, 2)], 4)?;

        assert_eq!(slashings.len(), 1);
        assert_eq!(slashings[0].reason, AttesterSlashingReason::DoubleVote);

        // A third conflicting vote is still paired with the first one.
        let slashings = attestations.detect_batch(vec![build_attestation(1, 2, 3)], 4)?;

        assert_eq!(slashings.len(), 1);
        assert_eq!(
            slashings[0].slashing.attestation_1.data.beacon_block_root,
            H256::repeat_byte(1),
        );

        Ok(())
    }

    #[test]
    fn disjoint_attesting_indices_in_the_same_validator_chunk_are_not_compared() -> Result<()> {
        let attestations = build_attestations_with_config(SlasherConfig {
            history_length: 64,
            chunk_size: 16,
            validator_chunk_size: 256,
        });

        let batch = vec![
            build_attestation_for(&[0], 1, 2, 1),
            build_attestation_for(&[1], 0, 3, 2),
        ];

        assert!(attestations.detect_batch(batch, 4)?.is_empty());

        Ok(())
    }

    #[test]
    fn validators_in_different_chunks_are_not_compared() -> Result<()> {
        let attestations = build_attestations();

        let batch = vec![
            build_attestation_for(&[0], 1, 2, 1),
            build_attestation_for(&[1_000_000], 0, 3, 2),
        ];

        assert!(attestations.detect_batch(batch, 4)?.is_empty());

        Ok(())
    }

    #[test]
    fn shared_attesting_indices_produce_one_slashing_pair() -> Result<()> {
        let attestations = build_attestations_with_config(SlasherConfig {
            history_length: 64,
            chunk_size: 16,
            validator_chunk_size: 256,
        });

        let batch = vec![
            build_attestation_for(&[0, 1], 1, 2, 1),
            build_attestation_for(&[0, 1], 0, 3, 2),
        ];

        let slashings = attestations.detect_batch(batch, 4)?;

        assert_eq!(slashings.len(), 1);

        Ok(())
    }

    #[test]
    fn history_grows_across_chunk_boundaries_without_false_positives() -> Result<()> {
        let attestations = build_attestations();

        for epoch in 16..=17 {
            let root_byte = u8::try_from(epoch)?;
            let batch = vec![build_attestation_for(&[0], epoch - 1, epoch, root_byte)];

            assert!(attestations.detect_batch(batch, epoch)?.is_empty());
        }

        Ok(())
    }

    #[test]
    fn span_cells_match_their_definitions_after_a_batch() -> Result<()> {
        let config = build_config();
        let attestations = build_attestations();

        let batch = vec![build_attestation(2, 5, 1), build_attestation(4, 9, 2)];
        attestations.detect_batch(batch, CURRENT_EPOCH)?;

        let min_chunk = attestations
            .spans
            .load((ChunkKind::MinSpan, 0, 1))?
            .expect("min span chunk was flushed");

        // min span cell at e: smallest target - e over attestations with source > e
        assert_eq!(min_chunk.cell(config, 1, 0), 5);
        assert_eq!(min_chunk.cell(config, 1, 1), 4);
        assert_eq!(min_chunk.cell(config, 1, 2), 7);
        assert_eq!(min_chunk.cell(config, 1, 3), 6);
        assert_eq!(min_chunk.cell(config, 1, 4), 64);

        let max_chunk = attestations
            .spans
            .load((ChunkKind::MaxSpan, 0, 1))?
            .expect("max span chunk was flushed");

        // max span cell at e: largest target - e over attestations with source < e
        assert_eq!(max_chunk.cell(config, 1, 2), 0);
        assert_eq!(max_chunk.cell(config, 1, 3), 2);
        assert_eq!(max_chunk.cell(config, 1, 4), 1);
        assert_eq!(max_chunk.cell(config, 1, 5), 4);
        assert_eq!(max_chunk.cell(config, 1, 6), 3);
        assert_eq!(max_chunk.cell(config, 1, 7), 2);
        assert_eq!(max_chunk.cell(config, 1, 8), 1);
        assert_eq!(max_chunk.cell(config, 1, 9), 0);

        Ok(())
    }

    #[test]
    fn replaying_a_batch_emits_nothing_new_and_leaves_spans_unchanged() -> Result<()> {
        let attestations = build_attestations();

        let batch = vec![build_attestation(1, 2, 1), build_attestation(0, 3, 2)];

        let first_run = attestations.detect_batch(batch.clone(), 4)?;
        assert_eq!(first_run.len(), 1);

        let min_before = attestations.spans.load((ChunkKind::MinSpan, 0, 1))?;
        let max_before = attestations.spans.load((ChunkKind::MaxSpan, 0, 1))?;

        let second_run = attestations.detect_batch(batch, 4)?;
        assert!(second_run.is_empty());

        assert_eq!(attestations.spans.load((ChunkKind::MinSpan, 0, 1))?, min_before);
        assert_eq!(attestations.spans.load((ChunkKind::MaxSpan, 0, 1))?, max_before);

        Ok(())
    }

    #[test]
    fn catch_up_preserves_detection_after_the_window_wraps() -> Result<()> {
        let attestations = build_attestations();

        let at_1 = build_attestation(1, 2, 1);
        let at_2 = build_attestation(3, 68, 2);
        let at_3 = build_attestation(10, 60, 3);

        assert!(attestations.detect_batch(vec![at_1], 2)?.is_empty());
        assert!(attestations.detect_batch(vec![at_2.clone()], 70)?.is_empty());

        let slashings = attestations.detect_batch(vec![at_3.clone()], 70)?;

        assert_eq!(slashings.len(), 1);
        assert_eq!(slashings[0].reason, AttesterSlashingReason::Surrounded);
        assert_eq!(slashings[0].slashing.attestation_1, at_3.attestation);
        assert_eq!(slashings[0].slashing.attestation_2, at_2.attestation);

        Ok(())
    }

    #[test]
    fn corrupt_chunk_bytes_abort_the_batch() -> Result<()> {
        let config = build_config();
        let spans_db = Database::in_memory();

        spans_db.put(build_chunk_key((ChunkKind::MinSpan, 0, 1)), [1, 2, 3])?;

        let attestations = Attestations::new(
            config,
            Database::in_memory(),
            Database::in_memory(),
            spans_db,
            Database::in_memory(),
        );

        assert!(attestations
            .detect_batch(vec![build_attestation(1, 2, 1)], 4)
            .is_err());

        Ok(())
    }

    #[test]
    fn cleanup_is_a_no_op_within_the_first_history_window() -> Result<()> {
        let attestations = build_attestations();

        attestations.detect_batch(vec![build_attestation(1, 2, 1)], 4)?;
        attestations.cleanup(10)?;

        assert!(attestations.attestation_votes.find(1, 2)?.is_some());

        // Far past the window the record is pruned.
        attestations.cleanup(1000)?;
        attestations.attestation_votes.find(1, 2)?.unwrap_none();

        Ok(())
    }
}
