//! Cryptographic primitives and the SPAKE2+ exchange.
//!
//! The suite is fixed by the protocol: SHA-256, HMAC-SHA256, HKDF-SHA256,
//! PBKDF2-HMAC-SHA256, P-256 ECDH and ECDSA, AES-128-CCM with a 16-byte tag.
//! No negotiation.

mod primitives;
pub mod spake2p;

pub use primitives::{
    aes128_ccm_decrypt, aes128_ccm_encrypt, ecdh, hkdf_sha256, hmac_sha256, p256_keypair,
    pbkdf2_sha256, sha256, sign_p256_sha256, verify_p256_sha256,
};
