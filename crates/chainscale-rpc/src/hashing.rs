//! Storage hashers.

use std::hash::Hasher;

use blake2::digest::consts::{U16, U32};
use blake2::{Blake2b, Digest};
use chainscale_metadata::StorageHasher;
use twox_hash::XxHash64;

pub fn blake2_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Blake2b::<U16>::digest(data));
    out
}

pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b::<U32>::digest(data));
    out
}

/// `N` rounds of xxHash64 with seeds `0..N`, little-endian, concatenated.
fn twox<const N: usize>(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(N * 8);
    for seed in 0..N as u64 {
        let mut h = XxHash64::with_seed(seed);
        h.write(data);
        out.extend_from_slice(&h.finish().to_le_bytes());
    }
    out
}

pub fn twox_64(data: &[u8]) -> Vec<u8> {
    twox::<1>(data)
}

pub fn twox_128(data: &[u8]) -> Vec<u8> {
    twox::<2>(data)
}

pub fn twox_256(data: &[u8]) -> Vec<u8> {
    twox::<4>(data)
}

/// Hash `data` the way `hasher` lays it out in a storage key, including the
/// raw `data` suffix for the concat hashers.
pub fn hash(hasher: StorageHasher, data: &[u8]) -> Vec<u8> {
    match hasher {
        StorageHasher::Blake2_128 => blake2_128(data).to_vec(),
        StorageHasher::Blake2_256 => blake2_256(data).to_vec(),
        StorageHasher::Blake2_128Concat => {
            let mut out = blake2_128(data).to_vec();
            out.extend_from_slice(data);
            out
        }
        StorageHasher::Twox128 => twox_128(data),
        StorageHasher::Twox256 => twox_256(data),
        StorageHasher::Twox64Concat => {
            let mut out = twox_64(data);
            out.extend_from_slice(data);
            out
        }
        StorageHasher::Identity => data.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twox_128_known_prefixes() {
        assert_eq!(hex::encode(twox_128(b"System")), "26aa394eea5630e07c48ae0c9558cef7");
        assert_eq!(hex::encode(twox_128(b"Events")), "80d41e5e16056765bc8461851072c9d7");
        assert_eq!(hex::encode(twox_128(b"Account")), "b99d880ec681799c0cf30e8886371da9");
    }

    #[test]
    fn blake2_128_concat_appends_the_key() {
        let alice =
            hex::decode("d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d").unwrap();
        let hashed = hash(StorageHasher::Blake2_128Concat, &alice);
        assert_eq!(hex::encode(&hashed[..16]), "de1e86a9a8c739864cf3cc5ec2bea59f");
        assert_eq!(&hashed[16..], &alice[..]);
    }

    #[test]
    fn output_lengths_match_hasher_metadata() {
        for hasher in [
            StorageHasher::Blake2_128,
            StorageHasher::Blake2_256,
            StorageHasher::Blake2_128Concat,
            StorageHasher::Twox128,
            StorageHasher::Twox256,
            StorageHasher::Twox64Concat,
            StorageHasher::Identity,
        ] {
            let suffix = if hasher.is_concat() { 3 } else { 0 };
            assert_eq!(hash(hasher, b"abc").len(), hasher.hash_len() + suffix);
        }
    }
}
