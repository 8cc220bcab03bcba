//! Cryptographic primitive contracts used across the stack.
//!
//! Everything here is a thin, fixed-suite wrapper: SHA-256 for hashing,
//! HMAC/HKDF/PBKDF2 over it for key derivation, P-256 for key agreement and
//! signatures, AES-128-CCM with a 16-byte tag for payload protection.

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::consts::{U13, U16};
use ccm::Ccm;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::core::{
    CryptoError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, P256_PRIVATE_KEY_SIZE, P256_PUBLIC_KEY_SIZE,
    P256_SIGNATURE_SIZE, SHA256_SIZE,
};

type Aes128Ccm = Ccm<Aes128, U16, U13>;
type HmacSha256 = Hmac<Sha256>;

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; SHA256_SIZE] {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC key length is unrestricted");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HKDF-SHA256 extract-and-expand into `out`; empty `salt` means no salt.
pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    Hkdf::<Sha256>::new(salt, ikm)
        .expand(info, out)
        .map_err(|_| CryptoError::KeyDerivationFailed)
}

/// PBKDF2-HMAC-SHA256 into `out`.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) {
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, out);
}

/// Fresh P-256 keypair as (uncompressed SEC1 public, raw private scalar).
pub fn p256_keypair() -> ([u8; P256_PUBLIC_KEY_SIZE], [u8; P256_PRIVATE_KEY_SIZE]) {
    let secret = SecretKey::random(&mut OsRng);
    let public = secret.public_key().to_encoded_point(false);
    let mut public_bytes = [0u8; P256_PUBLIC_KEY_SIZE];
    public_bytes.copy_from_slice(public.as_bytes());
    let mut private_bytes = [0u8; P256_PRIVATE_KEY_SIZE];
    private_bytes.copy_from_slice(&secret.to_bytes());
    (public_bytes, private_bytes)
}

/// ECDH shared secret (x-coordinate) between our scalar and a peer point.
pub fn ecdh(
    peer_public: &[u8],
    our_private: &[u8; P256_PRIVATE_KEY_SIZE],
) -> Result<[u8; 32], CryptoError> {
    let secret =
        SecretKey::from_slice(our_private).map_err(|_| CryptoError::KeyDerivationFailed)?;
    let peer =
        PublicKey::from_sec1_bytes(peer_public).map_err(|_| CryptoError::KeyDerivationFailed)?;
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes());
    Ok(out)
}

/// ECDSA-P256-SHA256 signature as raw r ∥ s.
pub fn sign_p256_sha256(
    message: &[u8],
    private: &[u8; P256_PRIVATE_KEY_SIZE],
) -> Result<[u8; P256_SIGNATURE_SIZE], CryptoError> {
    let key = SigningKey::from_slice(private).map_err(|_| CryptoError::KeyDerivationFailed)?;
    let signature: Signature = key.sign(message);
    let mut out = [0u8; P256_SIGNATURE_SIZE];
    out.copy_from_slice(&signature.to_bytes());
    Ok(out)
}

/// Verify a raw r ∥ s ECDSA-P256-SHA256 signature.
pub fn verify_p256_sha256(message: &[u8], signature: &[u8], public: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// AES-128-CCM encrypt; returns (ciphertext, 16-byte tag).
pub fn aes128_ccm_encrypt(
    plaintext: &[u8],
    key: &[u8; 16],
    nonce: &[u8; AEAD_NONCE_SIZE],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; AEAD_TAG_SIZE]), CryptoError> {
    let cipher = Aes128Ccm::new(GenericArray::from_slice(key));
    let mut sealed = cipher
        .encrypt(GenericArray::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    let tag_offset = sealed.len() - AEAD_TAG_SIZE;
    let mut tag = [0u8; AEAD_TAG_SIZE];
    tag.copy_from_slice(&sealed[tag_offset..]);
    sealed.truncate(tag_offset);
    Ok((sealed, tag))
}

/// AES-128-CCM decrypt-and-verify.
pub fn aes128_ccm_decrypt(
    ciphertext: &[u8],
    tag: &[u8],
    key: &[u8; 16],
    nonce: &[u8; AEAD_NONCE_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes128Ccm::new(GenericArray::from_slice(key));
    let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    cipher
        .decrypt(GenericArray::from_slice(nonce), Payload { msg: &sealed, aad })
        .map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hmac_matches_known_vector() {
        // RFC 4231 test case 2.
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn hkdf_matches_known_vector() {
        // RFC 5869 test case 1.
        let ikm = [0x0b; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();
        let mut okm = [0u8; 42];
        hkdf_sha256(&salt, &ikm, &info, &mut okm).unwrap();
        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn ecdh_is_symmetric() {
        let (pub_a, priv_a) = p256_keypair();
        let (pub_b, priv_b) = p256_keypair();
        let shared_ab = ecdh(&pub_b, &priv_a).unwrap();
        let shared_ba = ecdh(&pub_a, &priv_b).unwrap();
        assert_eq!(shared_ab, shared_ba);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (public, private) = p256_keypair();
        let signature = sign_p256_sha256(b"tbs data", &private).unwrap();
        assert!(verify_p256_sha256(b"tbs data", &signature, &public));
        assert!(!verify_p256_sha256(b"other data", &signature, &public));
        let (other_public, _) = p256_keypair();
        assert!(!verify_p256_sha256(b"tbs data", &signature, &other_public));
    }

    #[test]
    fn ccm_roundtrip_and_tamper_detection() {
        let key = [0x11; 16];
        let nonce = [0x22; 13];
        let (ciphertext, tag) = aes128_ccm_encrypt(b"secret", &key, &nonce, b"aad").unwrap();
        let plaintext = aes128_ccm_decrypt(&ciphertext, &tag, &key, &nonce, b"aad").unwrap();
        assert_eq!(plaintext, b"secret");

        let mut bad_tag = tag;
        bad_tag[0] ^= 1;
        assert!(aes128_ccm_decrypt(&ciphertext, &bad_tag, &key, &nonce, b"aad").is_err());
        assert!(aes128_ccm_decrypt(&ciphertext, &tag, &key, &nonce, b"other").is_err());
    }
}
