//! Primitives for the MEGA web API: the a32 word layout, key
//! derivation, AES-ECB key (un)wrapping, zero-IV CBC for attribute
//! blocks, chunk boundaries and MPI parsing.
//!
//! MEGA represents keys and hashes as arrays of big-endian u32 words
//! ("a32") and uses URL-safe unpadded base64 on the wire.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::BigUint;

pub fn bytes_to_a32(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_be_bytes(word)
        })
        .collect()
}

pub fn a32_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn b64url_decode(s: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(s.trim_end_matches('=')).ok()
}

fn aes128(key: &[u8]) -> Aes128 {
    Aes128::new(GenericArray::from_slice(&key[..16]))
}

/// AES-ECB over 16-byte blocks; MEGA wraps key material this way.
pub fn encrypt_key(data: &[u8], key: &[u8]) -> Vec<u8> {
    let cipher = aes128(key);
    let mut out = data.to_vec();
    for block in out.chunks_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    out
}

pub fn decrypt_key(data: &[u8], key: &[u8]) -> Vec<u8> {
    let cipher = aes128(key);
    let mut out = data.to_vec();
    for block in out.chunks_mut(16) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    out
}

/// AES-CBC with an all-zero IV, in place. `data` must be a multiple of
/// 16 bytes.
pub fn cbc_encrypt_zero_iv(data: &mut [u8], key: &[u8]) {
    let cipher = aes128(key);
    let mut prev = [0u8; 16];
    for block in data.chunks_mut(16) {
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= *p;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        prev.copy_from_slice(block);
    }
}

/// Legacy (v1 account) password key: 65536 rounds of keyed AES over a
/// fixed initial block.
pub fn prepare_key_v1(password: &[u8]) -> [u8; 16] {
    let mut pkey =
        a32_to_bytes(&[0x93C4_67E3, 0x7DB0_C7A4, 0xD1BE_3F81, 0x0152_CB56]);
    let words = bytes_to_a32(password);

    for _ in 0..0x10000 {
        for chunk in words.chunks(4) {
            let mut key = [0u32; 4];
            key[..chunk.len()].copy_from_slice(chunk);
            let cipher = aes128(&a32_to_bytes(&key));
            cipher.encrypt_block(GenericArray::from_mut_slice(&mut pkey));
        }
    }

    let mut out = [0u8; 16];
    out.copy_from_slice(&pkey);
    out
}

/// Legacy (v1 account) user handle: xor-fold the lowercased email into
/// one block, 16384 rounds of AES under the password key, emit words 0
/// and 2.
pub fn stringhash(email: &str, key: &[u8; 16]) -> String {
    let words = bytes_to_a32(email.as_bytes());
    let mut folded = [0u32; 4];
    for (i, word) in words.iter().enumerate() {
        folded[i % 4] ^= word;
    }

    let mut block = [0u8; 16];
    block.copy_from_slice(&a32_to_bytes(&folded));
    let cipher = aes128(key);
    for _ in 0..0x4000 {
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));
    }

    let hashed = bytes_to_a32(&block);
    b64url_encode(&a32_to_bytes(&[hashed[0], hashed[2]]))
}

/// Encrypted node attribute block: `MEGA` + compact JSON, zero-padded
/// to a block boundary, CBC with zero IV under the node key.
pub fn encrypt_attributes(filename: &str, key: &[u8]) -> String {
    let attrs = serde_json::json!({ "n": filename }).to_string();
    let mut data = format!("MEGA{attrs}").into_bytes();
    data.resize(data.len().div_ceil(16) * 16, 0);
    cbc_encrypt_zero_iv(&mut data, key);
    b64url_encode(&data)
}

/// Upload chunk boundaries: 128 KiB, 256 KiB, ... growing to 1 MiB,
/// then 1 MiB each. Returns `(offset, length)` pairs.
pub fn chunk_sizes(size: u64) -> Vec<(u64, u64)> {
    let mut chunks = Vec::new();
    let mut pos = 0u64;
    let mut step = 0x20000u64;

    while pos < size {
        let len = step.min(size - pos);
        chunks.push((pos, len));
        pos += len;
        if step < 0x100000 {
            step += 0x20000;
        }
    }

    chunks
}

/// Reads one MPI: a 2-byte big-endian bit count followed by the
/// magnitude bytes. Returns the integer and the remaining input.
pub fn read_mpi(data: &[u8]) -> Option<(BigUint, &[u8])> {
    if data.len() < 2 {
        return None;
    }
    let bits = u16::from_be_bytes([data[0], data[1]]) as usize;
    let len = bits.div_ceil(8);
    let rest = &data[2..];
    if rest.len() < len {
        return None;
    }
    Some((BigUint::from_bytes_be(&rest[..len]), &rest[len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a32_round_trip_pads_with_zeros() {
        assert_eq!(bytes_to_a32(&[1, 2, 3, 4, 5]), vec![0x01020304, 0x05000000]);
        assert_eq!(
            a32_to_bytes(&[0x01020304]),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_key_wrap_round_trip() {
        let key = [7u8; 16];
        let data = [42u8; 32];
        let wrapped = encrypt_key(&data, &key);
        assert_ne!(wrapped, data);
        assert_eq!(decrypt_key(&wrapped, &key), data);
    }

    #[test]
    fn test_cbc_zero_iv_differs_per_block_position() {
        let key = [3u8; 16];
        let mut data = [9u8; 32];
        cbc_encrypt_zero_iv(&mut data, &key);
        // identical plaintext blocks must not encrypt identically
        assert_ne!(data[..16], data[16..]);
    }

    #[test]
    fn test_prepare_key_v1_is_deterministic() {
        let a = prepare_key_v1(b"correct horse");
        let b = prepare_key_v1(b"correct horse");
        let c = prepare_key_v1(b"battery staple");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_stringhash_shape() {
        let key = prepare_key_v1(b"pw");
        let hash = stringhash("user@example.com", &key);
        // two a32 words -> 8 bytes -> 11 base64url chars, no padding
        assert_eq!(hash.len(), 11);
        assert!(!hash.contains('='));
    }

    #[test]
    fn test_chunk_sizes_grow_then_plateau() {
        let chunks = chunk_sizes(10 * 1024 * 1024);
        let lens: Vec<u64> = chunks.iter().map(|&(_, len)| len).collect();
        assert_eq!(lens[0], 0x20000);
        assert_eq!(lens[1], 0x40000);
        assert_eq!(lens[7], 0x100000);
        assert_eq!(lens[8], 0x100000);
        assert_eq!(lens.iter().sum::<u64>(), 10 * 1024 * 1024);

        // offsets are contiguous
        let mut expected = 0;
        for &(offset, len) in &chunks {
            assert_eq!(offset, expected);
            expected += len;
        }
    }

    #[test]
    fn test_chunk_sizes_small_and_empty_inputs() {
        assert_eq!(chunk_sizes(5), vec![(0, 5)]);
        assert!(chunk_sizes(0).is_empty());
    }

    #[test]
    fn test_read_mpi() {
        // 8-bit integer 0xFF followed by trailing bytes
        let data = [0x00, 0x08, 0xFF, 0xAA, 0xBB];
        let (value, rest) = read_mpi(&data).unwrap();
        assert_eq!(value, BigUint::from_bytes_be(&[0xFF]));
        assert_eq!(rest, &[0xAA, 0xBB]);

        assert!(read_mpi(&[0x00]).is_none());
        assert!(read_mpi(&[0x01, 0x00, 0x01]).is_none());
    }

    #[test]
    fn test_b64url_round_trip() {
        let data = b"\xfb\xef\xff";
        let encoded = b64url_encode(data);
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(b64url_decode(&encoded).unwrap(), data);
        // tolerate padded input from older servers
        assert_eq!(b64url_decode("aGk=").unwrap(), b"hi");
    }

    #[test]
    fn test_encrypt_attributes_block_aligned() {
        let blob = b64url_decode(&encrypt_attributes("a.txt", &[1u8; 16])).unwrap();
        assert_eq!(blob.len() % 16, 0);
        assert!(!blob.starts_with(b"MEGA"));
    }
}
