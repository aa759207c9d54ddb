use core::mem;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use database::Database;
use futures::{
    channel::mpsc::{Receiver, UnboundedSender},
    stream::StreamExt as _,
    try_join,
};
use log::{debug, info, warn};
use types::{
    containers::{BeaconBlockHeader, IndexedAttestation},
    primitives::Epoch,
};

use crate::{
    attestations::Attestations,
    blocks::Blocks,
    counters::Counters,
    messages::SlasherToSink,
    slasher_config::SlasherConfig,
    wrappers::{validate_attestation_integrity, AttestationWrapper, ProposalWrapper},
};

pub struct Databases {
    pub votes_db: Database,
    pub attestations_db: Database,
    pub spans_db: Database,
    pub epochs_db: Database,
    pub blocks_db: Database,
}

impl Databases {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            votes_db: Database::in_memory(),
            attestations_db: Database::in_memory(),
            spans_db: Database::in_memory(),
            epochs_db: Database::in_memory(),
            blocks_db: Database::in_memory(),
        }
    }
}

/// The ingest pipeline: two receiver tasks feed mutex-guarded queues, a batch
/// worker drains them on every epoch tick and publishes slashings to the
/// sink. Closing the inbound channels shuts the pipeline down; receivers exit
/// at their next suspension, the worker after the in-flight batch.
pub struct Slasher {
    config: SlasherConfig,
    attestations: Attestations,
    blocks: Blocks,
    counters: Arc<Counters>,
    attestation_queue: Arc<Mutex<Vec<AttestationWrapper>>>,
    block_queue: Arc<Mutex<Vec<ProposalWrapper>>>,
    attestations_rx: Receiver<IndexedAttestation>,
    blocks_rx: Receiver<BeaconBlockHeader>,
    ticks_rx: Receiver<Epoch>,
    sink_tx: UnboundedSender<SlasherToSink>,
}

impl Slasher {
    pub fn new(
        config: SlasherConfig,
        databases: Databases,
        attestations_rx: Receiver<IndexedAttestation>,
        blocks_rx: Receiver<BeaconBlockHeader>,
        ticks_rx: Receiver<Epoch>,
        sink_tx: UnboundedSender<SlasherToSink>,
    ) -> Result<Self> {
        let config = config.validate()?;

        let Databases {
            votes_db,
            attestations_db,
            spans_db,
            epochs_db,
            blocks_db,
        } = databases;

        Ok(Self {
            config,
            attestations: Attestations::new(config, votes_db, attestations_db, spans_db, epochs_db),
            blocks: Blocks::new(config, blocks_db),
            counters: Arc::new(Counters::default()),
            attestation_queue: Arc::default(),
            block_queue: Arc::default(),
            attestations_rx,
            blocks_rx,
            ticks_rx,
            sink_tx,
        })
    }

    #[must_use]
    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            attestations,
            blocks,
            counters,
            attestation_queue,
            block_queue,
            attestations_rx,
            blocks_rx,
            ticks_rx,
            sink_tx,
        } = self;

        let worker = BatchWorker {
            config,
            attestations,
            blocks,
            counters: counters.clone(),
            attestation_queue: attestation_queue.clone(),
            block_queue: block_queue.clone(),
            sink_tx,
        };

        try_join!(
            receive_attestations(attestations_rx, attestation_queue, counters.clone()),
            receive_blocks(blocks_rx, block_queue, counters),
            worker.run(ticks_rx),
        )?;

        Ok(())
    }
}

async fn receive_attestations(
    mut attestations_rx: Receiver<IndexedAttestation>,
    queue: Arc<Mutex<Vec<AttestationWrapper>>>,
    counters: Arc<Counters>,
) -> Result<()> {
    while let Some(attestation) = attestations_rx.next().await {
        Counters::increment(&counters.attestations_received);

        if !validate_attestation_integrity(&attestation) {
            Counters::increment(&counters.attestations_filtered);
            debug!("dropping attestation that failed the integrity filter: {attestation:?}");
            continue;
        }

        match AttestationWrapper::new(attestation) {
            Ok(wrapper) => queue
                .lock()
                .expect("attestation queue mutex is poisoned")
                .push(wrapper),
            Err(error) => {
                Counters::increment(&counters.attestations_filtered);
                warn!("dropping attestation without a signing root (error: {error})");
            }
        }
    }

    Ok(())
}

async fn receive_blocks(
    mut blocks_rx: Receiver<BeaconBlockHeader>,
    queue: Arc<Mutex<Vec<ProposalWrapper>>>,
    counters: Arc<Counters>,
) -> Result<()> {
    while let Some(header) = blocks_rx.next().await {
        Counters::increment(&counters.blocks_received);

        match ProposalWrapper::new(header) {
            Ok(wrapper) => queue
                .lock()
                .expect("block queue mutex is poisoned")
                .push(wrapper),
            Err(error) => warn!("dropping block header without a signing root (error: {error})"),
        }
    }

    Ok(())
}

struct BatchWorker {
    config: SlasherConfig,
    attestations: Attestations,
    blocks: Blocks,
    counters: Arc<Counters>,
    attestation_queue: Arc<Mutex<Vec<AttestationWrapper>>>,
    block_queue: Arc<Mutex<Vec<ProposalWrapper>>>,
    sink_tx: UnboundedSender<SlasherToSink>,
}

impl BatchWorker {
    async fn run(self, mut ticks_rx: Receiver<Epoch>) -> Result<()> {
        while let Some(current_epoch) = ticks_rx.next().await {
            debug!("epoch reached, processing queued attestations and blocks (epoch: {current_epoch})");

            self.process_attestation_batch(current_epoch);
            self.process_block_batch(current_epoch);
        }

        Ok(())
    }

    /// Detection failures abort only the current batch; the wrappers captured
    /// for it are discarded and the pipeline keeps running.
    fn process_attestation_batch(&self, current_epoch: Epoch) {
        let queued = mem::take(
            &mut *self
                .attestation_queue
                .lock()
                .expect("attestation queue mutex is poisoned"),
        );

        let mut batch = Vec::with_capacity(queued.len());
        let mut deferred = vec![];
        let mut dropped = 0_u64;

        for wrapper in queued {
            let target = wrapper.attestation.data.target;

            if target > current_epoch {
                // Not yet covered by a tick. Held for a later batch.
                deferred.push(wrapper);
            } else if current_epoch.saturating_sub(target) >= self.config.history_length {
                dropped += 1;
            } else {
                batch.push(wrapper);
            }
        }

        Counters::add(&self.counters.attestations_deferred, deferred.len() as u64);
        Counters::add(&self.counters.attestations_dropped, dropped);

        if !deferred.is_empty() {
            self.attestation_queue
                .lock()
                .expect("attestation queue mutex is poisoned")
                .extend(deferred);
        }

        let batch_size = batch.len();

        match self.attestations.detect_batch(batch, current_epoch) {
            Ok(explained_slashings) => {
                Counters::increment(&self.counters.batches_processed);

                let found = explained_slashings.len();

                for explained in explained_slashings {
                    info!("attester slashing constructed: {explained:?}");
                    Counters::increment(&self.counters.attester_slashings_found);
                    SlasherToSink::AttesterSlashing(explained.slashing).send(&self.sink_tx);
                }

                info!(
                    "attestation batch processed \
                     (epoch: {current_epoch}, attestations: {batch_size}, \
                      dropped: {dropped}, slashings: {found})",
                );

                if let Err(error) = self.attestations.cleanup(current_epoch) {
                    warn!("attestation history cleanup failed (error: {error})");
                }
            }
            Err(error) => {
                Counters::increment(&self.counters.batches_aborted);
                warn!(
                    "attestation batch aborted, queued attestations discarded \
                     (epoch: {current_epoch}, error: {error})",
                );
            }
        }
    }

    fn process_block_batch(&self, current_epoch: Epoch) {
        let batch = mem::take(
            &mut *self
                .block_queue
                .lock()
                .expect("block queue mutex is poisoned"),
        );

        let batch_size = batch.len();

        match self.blocks.detect_batch(&batch) {
            Ok(explained_slashings) => {
                let found = explained_slashings.len();

                for explained in explained_slashings {
                    info!("proposer slashing constructed: {explained:?}");
                    Counters::increment(&self.counters.proposer_slashings_found);
                    SlasherToSink::ProposerSlashing(explained.slashing).send(&self.sink_tx);
                }

                info!(
                    "block batch processed \
                     (epoch: {current_epoch}, blocks: {batch_size}, slashings: {found})",
                );

                if let Err(error) = self.blocks.cleanup(current_epoch) {
                    warn!("proposal history cleanup failed (error: {error})");
                }
            }
            Err(error) => {
                Counters::increment(&self.counters.batches_aborted);
                warn!(
                    "block batch aborted, queued blocks discarded \
                     (epoch: {current_epoch}, error: {error})",
                );
            }
        }
    }
}
