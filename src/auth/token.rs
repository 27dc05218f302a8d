//! Opaque bearer token format.
//!
//! A token is [`TOKEN_RANDOM_BYTES`] bytes from the OS random source, base32-encoded
//! (RFC 4648 alphabet, no padding). Only its SHA-256 digest is ever stored.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::models::TokenHash;

/// Number of random bytes behind every token.
pub const TOKEN_RANDOM_BYTES: usize = 16;

/// Length of the encoded plaintext: one base32 character per started 5-bit group.
pub const TOKEN_PLAINTEXT_LEN: usize = base32_len(TOKEN_RANDOM_BYTES);

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Unpadded base32 length for `bytes` input bytes.
pub const fn base32_len(bytes: usize) -> usize {
    (bytes * 8).div_ceil(5)
}

/// Generates a fresh plaintext from the OS random source.
pub fn generate_plaintext() -> Result<String, rand::Error> {
    generate_plaintext_with(&mut OsRng)
}

/// Generates a plaintext from `rng`. Fails only if the generator does.
pub fn generate_plaintext_with<R: RngCore + ?Sized>(rng: &mut R) -> Result<String, rand::Error> {
    let mut bytes = [0u8; TOKEN_RANDOM_BYTES];
    rng.try_fill_bytes(&mut bytes)?;
    Ok(encode_base32(&bytes))
}

/// SHA-256 of the plaintext's bytes.
pub fn hash_plaintext(plaintext: &str) -> TokenHash {
    TokenHash::from_bytes(Sha256::digest(plaintext.as_bytes()).into())
}

/// Cheap shape check run before any hashing or storage lookup.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LEN
        && plaintext.bytes().all(|b| BASE32_ALPHABET.contains(&b))
}

fn encode_base32(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(base32_len(bytes.len()));
    let mut buffer: u16 = 0;
    let mut bits: u8 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u16::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            encoded.push(BASE32_ALPHABET[usize::from((buffer >> bits) & 0x1f)] as char);
        }
    }
    if bits > 0 {
        encoded.push(BASE32_ALPHABET[usize::from((buffer << (5 - bits)) & 0x1f)] as char);
    }

    encoded
}
