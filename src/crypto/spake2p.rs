//! SPAKE2+ over P-256, the password-authenticated exchange under PASE.
//!
//! The verifier (device) holds `(w0, L)` derived offline from the setup
//! passcode; the prover (commissioner) derives `w0, w1` from the passcode
//! once it learns the PBKDF parameters. Both ends bind the exchange to a
//! context hash through the transcript `TT` and confirm with HMAC codes
//! `cA` / `cB` before any session key is used.

use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::elliptic_curve::{Field, PrimeField};
use p256::{AffinePoint, EncodedPoint, ProjectivePoint, Scalar};
use rand::rngs::OsRng;

use crate::core::{CryptoError, P256_PUBLIC_KEY_SIZE, SPAKE2P_VERIFIER_MATERIAL_SIZE};

use super::primitives::{hkdf_sha256, hmac_sha256, pbkdf2_sha256, sha256};

/// SPAKE2+ point M (compressed SEC1), fixed by the protocol.
const SPAKE_M: [u8; 33] = [
    0x02, 0x88, 0x6e, 0x2f, 0x97, 0xac, 0xe4, 0x6e, 0x55, 0xba, 0x9d, 0xd7, 0x24, 0x25, 0x79,
    0xf2, 0x99, 0x3b, 0x64, 0xe1, 0x6e, 0xf3, 0xdc, 0xab, 0x95, 0xaf, 0xd4, 0x97, 0x33, 0x3d,
    0x8f, 0xa1, 0x2f,
];

/// SPAKE2+ point N (compressed SEC1), fixed by the protocol.
const SPAKE_N: [u8; 33] = [
    0x03, 0xd8, 0xbb, 0xd6, 0xc6, 0x39, 0xc6, 0x29, 0x37, 0xb0, 0x4d, 0x99, 0x7f, 0x38, 0xc3,
    0x77, 0x07, 0x19, 0xc6, 0x29, 0xd7, 0x01, 0x4d, 0x49, 0xa2, 0x4b, 0x4f, 0x98, 0xba, 0xa1,
    0x29, 0x2b, 0x49,
];

const CONFIRMATION_INFO: &[u8] = b"ConfirmationKeys";

/// Outcome of a completed SPAKE2+ round: confirmation codes plus the
/// shared key seed `Ke`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakeSecrets {
    /// Prover confirmation code, sent in Pake3.
    pub c_a: [u8; 32],
    /// Verifier confirmation code, sent in Pake2.
    pub c_b: [u8; 32],
    /// Shared key seed, input to session-key derivation.
    pub ke: [u8; 16],
}

/// Device-side verifier material, computable offline from the passcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaseVerifier {
    /// w0 scalar, big-endian.
    pub w0: [u8; 32],
    /// L = w1·G, uncompressed SEC1.
    pub l: [u8; P256_PUBLIC_KEY_SIZE],
}

/// Derive `(w0, w1)` scalars from the passcode and PBKDF parameters.
pub fn derive_w0_w1(passcode: u32, salt: &[u8], iterations: u32) -> (Scalar, Scalar) {
    let mut ws = [0u8; SPAKE2P_VERIFIER_MATERIAL_SIZE];
    pbkdf2_sha256(&passcode.to_le_bytes(), salt, iterations, &mut ws);
    let w0 = scalar_from_wide_bytes(&ws[..40]);
    let w1 = scalar_from_wide_bytes(&ws[40..]);
    (w0, w1)
}

/// Compute the device's stored verifier `(w0, L)` from the passcode.
pub fn compute_verifier(passcode: u32, salt: &[u8], iterations: u32) -> PaseVerifier {
    let (w0, w1) = derive_w0_w1(passcode, salt, iterations);
    let l = ProjectivePoint::GENERATOR * w1;
    PaseVerifier {
        w0: w0.to_bytes().into(),
        l: point_bytes(&l),
    }
}

/// Prover (commissioner) side of one SPAKE2+ round.
pub struct Spake2pProver {
    w0: Scalar,
    w1: Scalar,
    x: Scalar,
    p_a: [u8; P256_PUBLIC_KEY_SIZE],
}

impl Spake2pProver {
    /// Start a round: derive `w0, w1` and pick the ephemeral share.
    pub fn new(passcode: u32, salt: &[u8], iterations: u32) -> Result<Self, CryptoError> {
        let (w0, w1) = derive_w0_w1(passcode, salt, iterations);
        let m = decode_point(&SPAKE_M)?;
        let x = Scalar::random(&mut OsRng);
        let big_x = ProjectivePoint::GENERATOR * x + m * w0;
        Ok(Self { w0, w1, x, p_a: point_bytes(&big_x) })
    }

    /// The share `pA` sent in Pake1.
    pub fn share(&self) -> [u8; P256_PUBLIC_KEY_SIZE] {
        self.p_a
    }

    /// Finish the round against the verifier share `pB`.
    ///
    /// The caller must compare the returned `c_b` with the one received in
    /// Pake2 before trusting `ke`.
    pub fn complete(&self, p_b: &[u8], context: &[u8; 32]) -> Result<PakeSecrets, CryptoError> {
        let n = decode_point(&SPAKE_N)?;
        let y = decode_point(p_b)?;
        // Z = x·(Y − w0·N), V = w1·(Y − w0·N)
        let unmasked = y - n * self.w0;
        let z = unmasked * self.x;
        let v = unmasked * self.w1;
        derive_secrets(context, &self.p_a, p_b, &z, &v, &self.w0)
    }
}

/// Verifier (device) side of one SPAKE2+ round.
pub struct Spake2pVerifier {
    w0: Scalar,
    l: ProjectivePoint,
}

impl Spake2pVerifier {
    /// Load the stored verifier material.
    pub fn new(verifier: &PaseVerifier) -> Result<Self, CryptoError> {
        let w0 = Option::<Scalar>::from(Scalar::from_repr(verifier.w0.into()))
            .ok_or(CryptoError::KeyDerivationFailed)?;
        let l = decode_point(&verifier.l)?;
        Ok(Self { w0, l })
    }

    /// Respond to `pA`: produce `pB` and the shared secrets in one step.
    pub fn respond(
        &self,
        p_a: &[u8],
        context: &[u8; 32],
    ) -> Result<([u8; P256_PUBLIC_KEY_SIZE], PakeSecrets), CryptoError> {
        let m = decode_point(&SPAKE_M)?;
        let n = decode_point(&SPAKE_N)?;
        let x = decode_point(p_a)?;
        let y = Scalar::random(&mut OsRng);
        let big_y = ProjectivePoint::GENERATOR * y + n * self.w0;
        let p_b = point_bytes(&big_y);
        // Z = y·(X − w0·M), V = y·L
        let z = (x - m * self.w0) * y;
        let v = self.l * y;
        let secrets = derive_secrets(context, p_a, &p_b, &z, &v, &self.w0)?;
        Ok((p_b, secrets))
    }
}

/// Hash the transcript and derive confirmation codes and `Ke`.
fn derive_secrets(
    context: &[u8; 32],
    p_a: &[u8],
    p_b: &[u8],
    z: &ProjectivePoint,
    v: &ProjectivePoint,
    w0: &Scalar,
) -> Result<PakeSecrets, CryptoError> {
    let mut tt = Vec::with_capacity(512);
    append_tt(&mut tt, context);
    append_tt(&mut tt, b""); // identity A
    append_tt(&mut tt, b""); // identity B
    append_tt(&mut tt, &SPAKE_M);
    append_tt(&mut tt, &SPAKE_N);
    append_tt(&mut tt, p_a);
    append_tt(&mut tt, p_b);
    append_tt(&mut tt, &point_bytes(z));
    append_tt(&mut tt, &point_bytes(v));
    let w0_bytes: [u8; 32] = w0.to_bytes().into();
    append_tt(&mut tt, &w0_bytes);

    let tt_hash = sha256(&tt);
    let (ka, ke) = tt_hash.split_at(16);

    let mut confirmation_keys = [0u8; 32];
    hkdf_sha256(&[], ka, CONFIRMATION_INFO, &mut confirmation_keys)?;
    let (kc_a, kc_b) = confirmation_keys.split_at(16);

    let mut ke_out = [0u8; 16];
    ke_out.copy_from_slice(ke);
    Ok(PakeSecrets {
        c_a: hmac_sha256(kc_a, p_b),
        c_b: hmac_sha256(kc_b, p_a),
        ke: ke_out,
    })
}

fn append_tt(tt: &mut Vec<u8>, element: &[u8]) {
    tt.extend_from_slice(&(element.len() as u64).to_le_bytes());
    tt.extend_from_slice(element);
}

fn point_bytes(point: &ProjectivePoint) -> [u8; P256_PUBLIC_KEY_SIZE] {
    let encoded = point.to_affine().to_encoded_point(false);
    let mut out = [0u8; P256_PUBLIC_KEY_SIZE];
    out.copy_from_slice(encoded.as_bytes());
    out
}

fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint, CryptoError> {
    let encoded =
        EncodedPoint::from_bytes(bytes).map_err(|_| CryptoError::KeyDerivationFailed)?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or(CryptoError::KeyDerivationFailed)?;
    let point = ProjectivePoint::from(affine);
    if point == ProjectivePoint::IDENTITY {
        return Err(CryptoError::KeyDerivationFailed);
    }
    Ok(point)
}

/// Interpret big-endian bytes wider than the group order as a scalar mod n.
fn scalar_from_wide_bytes(bytes: &[u8]) -> Scalar {
    let radix = Scalar::from(256u64);
    let mut acc = Scalar::ZERO;
    for byte in bytes {
        acc = acc * radix + Scalar::from(*byte as u64);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSCODE: u32 = 20202021;
    const ITERATIONS: u32 = 1000;

    #[test]
    fn prover_and_verifier_agree() {
        let salt = [0x5A; 32];
        let verifier = compute_verifier(PASSCODE, &salt, ITERATIONS);
        let device = Spake2pVerifier::new(&verifier).unwrap();
        let prover = Spake2pProver::new(PASSCODE, &salt, ITERATIONS).unwrap();
        let context = sha256(b"pbkdf exchange transcript");

        let p_a = prover.share();
        let (p_b, device_secrets) = device.respond(&p_a, &context).unwrap();
        let prover_secrets = prover.complete(&p_b, &context).unwrap();

        assert_eq!(device_secrets, prover_secrets);
    }

    #[test]
    fn wrong_passcode_diverges() {
        let salt = [0x5A; 32];
        let verifier = compute_verifier(PASSCODE, &salt, ITERATIONS);
        let device = Spake2pVerifier::new(&verifier).unwrap();
        let prover = Spake2pProver::new(PASSCODE + 1, &salt, ITERATIONS).unwrap();
        let context = sha256(b"ctx");

        let p_a = prover.share();
        let (p_b, device_secrets) = device.respond(&p_a, &context).unwrap();
        let prover_secrets = prover.complete(&p_b, &context).unwrap();

        assert_ne!(device_secrets.c_a, prover_secrets.c_a);
        assert_ne!(device_secrets.ke, prover_secrets.ke);
    }

    #[test]
    fn context_binds_the_exchange() {
        let salt = [1u8; 16];
        let verifier = compute_verifier(PASSCODE, &salt, ITERATIONS);
        let device = Spake2pVerifier::new(&verifier).unwrap();
        let prover = Spake2pProver::new(PASSCODE, &salt, ITERATIONS).unwrap();

        let p_a = prover.share();
        let (p_b, device_secrets) = device.respond(&p_a, &sha256(b"one")).unwrap();
        let prover_secrets = prover.complete(&p_b, &sha256(b"two")).unwrap();
        assert_ne!(device_secrets.c_b, prover_secrets.c_b);
    }

    #[test]
    fn wide_scalar_reduction_matches_narrow_values() {
        // 40-byte input with only the low 8 bytes set equals the plain scalar.
        let mut wide = [0u8; 40];
        wide[32..].copy_from_slice(&0x0123456789ABCDEFu64.to_be_bytes());
        assert_eq!(
            scalar_from_wide_bytes(&wide),
            Scalar::from(0x0123456789ABCDEFu64)
        );
    }

    #[test]
    fn verifier_material_is_deterministic() {
        let salt = [9u8; 32];
        let a = compute_verifier(PASSCODE, &salt, ITERATIONS);
        let b = compute_verifier(PASSCODE, &salt, ITERATIONS);
        assert_eq!(a, b);
        let c = compute_verifier(PASSCODE, &salt, ITERATIONS + 1);
        assert_ne!(a, c);
    }
}
