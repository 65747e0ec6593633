//! BLS signing capability bound to a single validator key.
//!
//! Secret scalars are only ever held inside [`BlsSecretKey`] and
//! [`ArtifactSigner`]; neither type hands the bytes back out, and their `Debug`
//! output is redacted.

use std::fmt;

use blst::min_pk::{PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use zeroize::Zeroizing;

/// Ciphersuite tag for Ethereum consensus-layer BLS signatures.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

pub const SECRET_KEY_LENGTH: usize = 32;
pub const PUBLIC_KEY_LENGTH: usize = 48;
pub const SIGNATURE_LENGTH: usize = 96;

/// Decodes a hex secret key, with or without a `0x` prefix.
///
/// Returns `None` when the text is not hex or the bytes are not a valid
/// non-zero scalar below the group order.
pub(crate) fn parse_bls_secret_key(text: &str) -> Option<BlsSecretKey> {
    let trimmed = text.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = Zeroizing::new(hex::decode(hex_part).ok()?);
    BlsSecretKey::from_bytes(&bytes)
}

/// Validated BLS12-381 secret scalar.
#[derive(Clone)]
pub struct BlsSecretKey {
    inner: SecretKey,
}

impl BlsSecretKey {
    /// Accepts exactly 32 big-endian bytes forming a valid scalar.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return None;
        }
        SecretKey::from_bytes(bytes)
            .ok()
            .map(|inner| Self { inner })
    }

    #[must_use]
    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey {
            inner: self.inner.sk_to_pk(),
        }
    }
}

impl fmt::Debug for BlsSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlsSecretKey(<redacted>)")
    }
}

#[derive(Clone)]
pub struct BlsPublicKey {
    inner: PublicKey,
}

impl BlsPublicKey {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.inner.compress()
    }

    /// Lowercase hex without a prefix; the form used as a signer identifier.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey({})", self.to_hex())
    }
}

#[derive(Clone)]
pub struct ArtifactSignature {
    inner: Signature,
}

impl ArtifactSignature {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.inner.compress()
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Checks this signature over `message` against `public_key`.
    #[must_use]
    pub fn verify(&self, message: &[u8], public_key: &BlsPublicKey) -> bool {
        self.inner
            .verify(true, message, BLS_DST, &[], &public_key.inner, true)
            == BLST_ERROR::BLST_SUCCESS
    }
}

impl PartialEq for ArtifactSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for ArtifactSignature {}

impl fmt::Debug for ArtifactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactSignature({})", self.to_hex())
    }
}

/// Where the key material of an [`ArtifactSigner`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Embedded,
    RemoteVault { host: String, key_path: String },
}

/// Signing capability for one validator key.
pub struct ArtifactSigner {
    secret_key: BlsSecretKey,
    public_key: BlsPublicKey,
    source: KeySource,
}

impl ArtifactSigner {
    #[must_use]
    pub fn new(secret_key: BlsSecretKey, source: KeySource) -> Self {
        let public_key = secret_key.public_key();
        Self {
            secret_key,
            public_key,
            source,
        }
    }

    /// Hex public key derived from the held secret.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.public_key.to_hex()
    }

    #[must_use]
    pub fn public_key(&self) -> &BlsPublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn source(&self) -> &KeySource {
        &self.source
    }

    /// Signs `message`. BLS signing is deterministic, so equal messages
    /// always produce equal signatures.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> ArtifactSignature {
        ArtifactSignature {
            inner: self.secret_key.inner.sign(message, BLS_DST, &[]),
        }
    }
}

impl fmt::Debug for ArtifactSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactSigner")
            .field("public_key", &self.public_key)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Strips an optional `0x` prefix and lowercases.
#[must_use]
pub fn normalize_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}
