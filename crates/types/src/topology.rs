//! Address-to-shard routing.

use crate::{Address, ShardId};

/// Compute which shard owns an address.
///
/// Pure function of the address: Blake3 of the address bytes, first eight
/// bytes read little-endian, modulo the shard count. A shard count of zero is
/// treated as a single shard.
pub fn shard_for_address(address: &Address, num_shards: u64) -> ShardId {
    let hash = blake3::hash(address.as_bytes());
    let bytes = hash.as_bytes();
    let hash_value = u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);
    ShardId(hash_value % num_shards.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_shard_is_within_range() {
        for seed in 0u8..=255 {
            let addr = Address::from_public_key(&[seed; 32]);
            assert!(shard_for_address(&addr, 4).0 < 4);
        }
    }

    #[test]
    fn test_single_shard_maps_everything_to_zero() {
        let addr = Address::from_public_key(&[3u8; 32]);
        assert_eq!(shard_for_address(&addr, 1), ShardId(0));
        assert_eq!(shard_for_address(&addr, 0), ShardId(0));
    }

    #[test]
    fn test_addresses_spread_over_shards() {
        let shards: HashSet<_> = (0u8..64)
            .map(|seed| shard_for_address(&Address::from_public_key(&[seed; 32]), 4))
            .collect();
        assert_eq!(shards.len(), 4);
    }
}
