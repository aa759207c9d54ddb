use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use database::Database;
use derive_more::Constructor;
use types::primitives::{Epoch, ValidatorIndex};

use crate::{
    chunks::{ChunkKind, SpanChunk},
    slasher_config::SlasherConfig,
};

const KIND_SIZE: usize = size_of::<u8>();
const CHUNK_INDEX_SIZE: usize = size_of::<u64>();
const CHUNK_KEY_LENGTH: usize = KIND_SIZE + 2 * CHUNK_INDEX_SIZE;
const VALIDATOR_INDEX_SIZE: usize = size_of::<ValidatorIndex>();

// Kind,ChunkIndex,ValidatorChunkIndex -> chunk bytes
type ChunkKey = [u8; CHUNK_KEY_LENGTH];

// ValidatorIndex -> Epoch
type EpochKey = [u8; VALIDATOR_INDEX_SIZE];

pub type ChunkId = (ChunkKind, u64, u64);

pub(crate) fn build_chunk_key((kind, chunk_index, validator_chunk_index): ChunkId) -> ChunkKey {
    let mut key = [0; CHUNK_KEY_LENGTH];
    key[0] = kind.tag();
    key[KIND_SIZE..KIND_SIZE + CHUNK_INDEX_SIZE].copy_from_slice(&chunk_index.to_be_bytes());
    key[KIND_SIZE + CHUNK_INDEX_SIZE..].copy_from_slice(&validator_chunk_index.to_be_bytes());
    key
}

fn build_epoch_key(validator_index: ValidatorIndex) -> EpochKey {
    validator_index.to_be_bytes()
}

/// Persistence for span chunks and per-validator latest written epochs.
#[derive(Constructor)]
pub struct SpanStore {
    config: SlasherConfig,
    spans_db: Database,
    epochs_db: Database,
}

impl SpanStore {
    pub fn load(&self, chunk_id: ChunkId) -> Result<Option<SpanChunk>> {
        let (kind, _, _) = chunk_id;
        let bytes = self.spans_db.get(build_chunk_key(chunk_id))?;

        if let Some(bytes) = bytes {
            return SpanChunk::from_bytes(kind, self.config, &bytes).map(Some);
        }

        Ok(None)
    }

    /// Writes all chunks in one atomic batch.
    pub fn save_chunks(
        &self,
        chunks: impl IntoIterator<Item = (ChunkId, Vec<u8>)>,
    ) -> Result<()> {
        self.spans_db.put_batch(
            chunks
                .into_iter()
                .map(|(chunk_id, bytes)| (build_chunk_key(chunk_id), bytes)),
        )
    }

    pub fn latest_written_epoch(&self, validator_index: ValidatorIndex) -> Result<Option<Epoch>> {
        let bytes = self.epochs_db.get(build_epoch_key(validator_index))?;

        if let Some(bytes) = bytes {
            let epoch = Epoch::from_le_bytes(bytes.as_slice().try_into()?);
            return Ok(Some(epoch));
        }

        Ok(None)
    }

    pub fn save_latest_written_epochs(
        &self,
        validator_indices: impl IntoIterator<Item = ValidatorIndex>,
        epoch: Epoch,
    ) -> Result<()> {
        self.epochs_db.put_batch(
            validator_indices
                .into_iter()
                .map(|validator_index| (build_epoch_key(validator_index), epoch.to_le_bytes())),
        )
    }
}

/// Batch-scoped view over the span tables.
///
/// Each chunk is read from the store at most once per batch; missing chunks
/// materialize as empty. Mutated chunks are buffered and written back in one
/// atomic batch by [`Self::flush`]. Dropping the cache without flushing
/// discards the batch.
pub struct SpanCache<'store> {
    store: &'store SpanStore,
    config: SlasherConfig,
    chunks: BTreeMap<ChunkId, SpanChunk>,
    dirty: BTreeSet<ChunkId>,
}

impl<'store> SpanCache<'store> {
    pub fn new(store: &'store SpanStore) -> Self {
        Self {
            store,
            config: store.config,
            chunks: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn chunk(&mut self, chunk_id: ChunkId) -> Result<&SpanChunk> {
        self.load(chunk_id)?;
        Ok(&self.chunks[&chunk_id])
    }

    pub fn chunk_mut(&mut self, chunk_id: ChunkId) -> Result<&mut SpanChunk> {
        self.load(chunk_id)?;
        self.dirty.insert(chunk_id);

        Ok(self
            .chunks
            .get_mut(&chunk_id)
            .expect("chunk was inserted by load"))
    }

    /// Writes back every dirty chunk, then records `current_epoch` as the
    /// latest written epoch of every validator in the processed chunks.
    pub fn flush(
        self,
        current_epoch: Epoch,
        validator_chunk_indices: impl IntoIterator<Item = u64>,
    ) -> Result<()> {
        let Self {
            store,
            config,
            chunks,
            dirty,
        } = self;

        store.save_chunks(
            dirty
                .into_iter()
                .map(|chunk_id| (chunk_id, chunks[&chunk_id].to_bytes(config))),
        )?;

        let validator_indices = validator_chunk_indices
            .into_iter()
            .flat_map(|validator_chunk_index| {
                config.validator_indices_in_chunk(validator_chunk_index)
            });

        store.save_latest_written_epochs(validator_indices, current_epoch)
    }

    fn load(&mut self, chunk_id: ChunkId) -> Result<()> {
        if !self.chunks.contains_key(&chunk_id) {
            let chunk = match self.store.load(chunk_id)? {
                Some(chunk) => chunk,
                None => SpanChunk::empty(chunk_id.0, self.config),
            };

            self.chunks.insert(chunk_id, chunk);
        }

        Ok(())
    }
}
