use primitive_types::H256;
use sha2::{Digest as _, Sha256};

#[must_use]
pub fn hash(bytes: impl AsRef<[u8]>) -> H256 {
    H256(Sha256::digest(bytes).into())
}
