use bincode::{Decode, Encode};

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct PartSetHeader {
    pub total: u32,
    pub hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct BlockId {
    pub hash: Vec<u8>,
    pub parts_header: PartSetHeader,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Header {
    pub chain_id: String,
    pub height: u64,
    /// Unix time in milliseconds
    pub time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Data {
    pub txs: Vec<Vec<u8>>,
}

/// Signatures of a block, as carried by the next block or seen locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Commit {
    pub height: u64,
    pub block_id: BlockId,
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Block {
    pub header: Header,
    pub data: Data,
    /// Commit of the previous block, stored under `C:{height - 1}`
    pub last_commit: Option<Commit>,
}

/// Stored under `H:{height}`; describes how the block was split into parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct BlockMeta {
    pub block_id: BlockId,
    pub header: Header,
}

/// One chunk of a block's encoding, stored under `P:{height}:{index}`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Part {
    pub index: u32,
    pub bytes: Vec<u8>,
}

impl Block {
    pub fn new(chain_id: &str, height: u64, txs: Vec<Vec<u8>>) -> Self {
        Block {
            header: Header {
                chain_id: chain_id.to_owned(),
                height,
                time: 0,
            },
            data: Data { txs },
            last_commit: None,
        }
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }
}
