use core::ops::Range;
use std::{
    borrow::Cow,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use bytesize::ByteSize;
use im::OrdMap;
use libmdbx::{DatabaseFlags, Environment, Geometry, WriteFlags};
use log::info;
use snap::raw::{Decoder, Encoder};
use tap::Pipe as _;
use unwrap_none::UnwrapNone as _;

const GROWTH_STEP: ByteSize = ByteSize::mib(256);
const MAX_NAMED_DATABASES: usize = 8;

/// A key-value store of snappy-compressed byte slices.
///
/// The persistent variant is the production backend.
/// The in-memory variant backs tests and ephemeral runs.
pub struct Database(DatabaseKind);

impl Database {
    pub fn persistent(name: &str, directory: impl AsRef<Path>, max_size: ByteSize) -> Result<Self> {
        fs_err::create_dir_all(&directory)?;

        let environment = Environment::builder()
            .set_max_dbs(MAX_NAMED_DATABASES)
            .set_geometry(Geometry {
                size: Some(..usize::try_from(max_size.as_u64())?),
                growth_step: Some(isize::try_from(GROWTH_STEP.as_u64())?),
                shrink_threshold: None,
                page_size: None,
            })
            .open(directory.as_ref())?;

        let transaction = environment.begin_rw_txn()?;
        transaction.create_db(Some(name), DatabaseFlags::default())?;
        transaction.commit()?;

        info!("database {name} opened at {}", directory.as_ref().display());

        Ok(Self(DatabaseKind::Persistent {
            database_name: name.to_owned(),
            environment,
        }))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self(DatabaseKind::InMemory {
            map: Mutex::default(),
        })
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                transaction
                    .get::<Cow<_>>(database.dbi(), key.as_ref())?
                    .map(|compressed| decompress(&compressed))
            }
            DatabaseKind::InMemory { map } => map
                .lock()
                .expect("in-memory database mutex is poisoned")
                .get(key.as_ref())
                .map(|compressed| decompress(compressed)),
        }
        .transpose()
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_batch(core::iter::once((key, value)))
    }

    /// Writes all pairs or none of them.
    pub fn put_batch(
        &self,
        pairs: impl IntoIterator<Item = (impl AsRef<[u8]>, impl AsRef<[u8]>)>,
    ) -> Result<()> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_rw_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                for (key, value) in pairs {
                    let compressed = compress(value.as_ref())?;
                    transaction.put(database.dbi(), key.as_ref(), compressed, WriteFlags::default())?;
                }

                transaction.commit()?;
            }
            DatabaseKind::InMemory { map } => {
                // The map is swapped as a whole so that a panic mid-iteration
                // cannot leave a partial write behind.
                let mut map = map.lock().expect("in-memory database mutex is poisoned");
                let mut new_map = map.clone();

                for (key, value) in pairs {
                    let compressed = compress(value.as_ref())?.into();
                    new_map.insert(key.as_ref().into(), compressed);
                }

                *map = new_map;
            }
        }
        .pipe(Ok)
    }

    /// Deletes every key in `range`, start inclusive, end exclusive.
    pub fn delete_range(&self, range: Range<impl AsRef<[u8]>>) -> Result<()> {
        let start = range.start.as_ref();
        let end = range.end.as_ref();

        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_rw_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                let mut cursor = transaction.cursor(&database)?;

                let Some((mut key, ())) = cursor.set_range::<Cow<_>, _>(start)? else {
                    return Ok(());
                };

                while *key < *end {
                    cursor.del(WriteFlags::default())?;
                    match cursor.next::<Cow<_>, _>()? {
                        Some((next_key, ())) => key = next_key,
                        None => break,
                    }
                }

                transaction.commit()?;
            }
            DatabaseKind::InMemory { map } => {
                let mut map = map.lock().expect("in-memory database mutex is poisoned");
                let mut new_map = map.clone();

                // `OrdMap::split` discards the split key, so the pair at `end`
                // has to be put back afterwards.
                let end_pair = map.get_key_value(end);
                let (below, _) = new_map.split(start);
                let (_, above) = new_map.split(end);

                new_map = below.union(above);

                if let Some((key, value)) = end_pair {
                    new_map
                        .insert(Arc::clone(key), Arc::clone(value))
                        .expect_none("end_pair should have been discarded by OrdMap::split");
                }

                *map = new_map;
            }
        }

        Ok(())
    }

    const fn kind(&self) -> &DatabaseKind {
        &self.0
    }
}

enum DatabaseKind {
    Persistent {
        database_name: String,
        environment: Environment,
    },
    InMemory {
        // `OrdMap` clones elements on structural updates, so keys and values
        // must be cheaply cloneable.
        map: Mutex<InMemoryMap>,
    },
}

type InMemoryMap = OrdMap<Arc<[u8]>, Arc<[u8]>>;

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    Encoder::new().compress_vec(data).map_err(Into::into)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    Decoder::new().decompress_vec(data).map_err(Into::into)
}
