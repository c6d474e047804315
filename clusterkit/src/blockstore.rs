//! Operations on the block archive and its transaction index

mod indexer;
mod pruner;
mod store;
mod tx_index;
mod types;

pub use indexer::{hash_key, index_blocks, index_by_hash, IndexReport, HASH_INDEX_PREFIX};
pub use pruner::{PruneReport, Pruner};
pub use store::{commit_key, meta_key, part_key, seen_commit_key, BlockStore, PART_SIZE};
pub use tx_index::{height_key, tx_hash, TxIndexStore, TxResult};
pub use types::{Block, BlockId, BlockMeta, Commit, Data, Header, Part, PartSetHeader};

use bincode::{config, Decode, Encode};

use crate::{Error, Result};

pub(crate) fn encode<T: Encode>(value: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(value, config::standard()).map_err(|e| {
        Error::CorruptedData(format!(
            "unable to serialize {}: {e}",
            std::any::type_name::<T>()
        ))
    })
}

pub(crate) fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::decode_from_slice(bytes, config::standard())
        .map_err(|e| {
            Error::CorruptedData(format!(
                "unable to deserialize {}: {e}",
                std::any::type_name::<T>()
            ))
        })?
        .0)
}
