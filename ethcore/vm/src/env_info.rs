use ethereum_types::{Address, H256, U256};
use std::collections::VecDeque;

/// Block-level context visible to `COINBASE`/`TIMESTAMP`/`NUMBER`/
/// `DIFFICULTY`/`GASLIMIT`/`BLOCKHASH` (§4.9 Block info).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvInfo {
    pub number: u64,
    pub author: Address,
    pub timestamp: u64,
    pub difficulty: U256,
    pub gas_limit: U256,
    pub gas_used: U256,
    /// The most recent block hashes, most recent first, at most 256 deep.
    pub last_hashes: VecDeque<H256>,
}

impl EnvInfo {
    /// Hash of block `number - depth`, or zero if `depth` reaches past the
    /// 256-block window `BLOCKHASH` is allowed to see, or past genesis.
    pub fn block_hash(&self, depth: u64) -> H256 {
        if depth == 0 || depth > 256 {
            return H256::zero();
        }
        self.last_hashes
            .get((depth - 1) as usize)
            .copied()
            .unwrap_or_else(H256::zero)
    }
}

impl Default for EnvInfo {
    fn default() -> Self {
        EnvInfo {
            number: 0,
            author: Address::zero(),
            timestamp: 0,
            difficulty: U256::zero(),
            gas_limit: U256::zero(),
            gas_used: U256::zero(),
            last_hashes: VecDeque::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hash_is_zero_outside_the_256_block_window() {
        let env = EnvInfo::default();
        assert_eq!(env.block_hash(0), H256::zero());
        assert_eq!(env.block_hash(257), H256::zero());
    }

    #[test]
    fn block_hash_looks_up_by_depth() {
        let mut env = EnvInfo::default();
        env.last_hashes.push_back(H256::repeat_byte(1));
        env.last_hashes.push_back(H256::repeat_byte(2));
        assert_eq!(env.block_hash(1), H256::repeat_byte(1));
        assert_eq!(env.block_hash(2), H256::repeat_byte(2));
        assert_eq!(env.block_hash(3), H256::zero());
    }
}
