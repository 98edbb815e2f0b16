//! Authenticated encryption wrapper around another codec.
//!
//! Sealed values have the layout `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! Every call to `marshal` draws a fresh random nonce.

use crate::error::{CodecError, CodecResult};
use crate::json::JsonCodec;
use crate::Codec;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const HKDF_INFO: &[u8] = b"reldb-value-key-v1";

/// AES-256-GCM key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKeySize`] unless `bytes` is exactly
    /// [`KEY_SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CodecError::InvalidKeySize {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self { bytes })
    }

    /// Derives a key from a passphrase and salt with HKDF-SHA256.
    ///
    /// HKDF does not slow down brute force; the passphrase should already
    /// carry enough entropy.
    pub fn derive(password: &[u8], salt: &[u8]) -> CodecResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), password);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(HKDF_INFO, &mut bytes)
            .map_err(|e| CodecError::KeyDerivationFailed {
                message: e.to_string(),
            })?;
        Ok(Self { bytes })
    }

    /// Returns the raw key bytes. Never log the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Seals the output of an inner codec with AES-256-GCM.
///
/// ```rust
/// use reldb_codec::{Codec, EncryptedCodec};
///
/// let codec: EncryptedCodec = EncryptedCodec::new(&[7u8; 32]).unwrap();
/// let sealed = codec.marshal(&"secret").unwrap();
/// let opened: String = codec.unmarshal(&sealed).unwrap();
/// assert_eq!(opened, "secret");
/// ```
pub struct EncryptedCodec<C = JsonCodec> {
    inner: C,
    cipher: Aes256Gcm,
}

impl<C: Codec + Default> EncryptedCodec<C> {
    /// Creates an encrypted codec over `C::default()` from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKeySize`] unless the key is 32 bytes.
    pub fn new(key: &[u8]) -> CodecResult<Self> {
        Ok(Self::with_codec(C::default(), &EncryptionKey::from_bytes(key)?))
    }
}

impl<C: Codec> EncryptedCodec<C> {
    /// Creates an encrypted codec over `inner`.
    #[must_use]
    pub fn with_codec(inner: C, key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { inner, cipher }
    }

    /// Returns the wrapped codec.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn seal(&self, plaintext: &[u8]) -> CodecResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CodecError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> CodecResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CodecError::decryption_failed(format!(
                "sealed value is {} bytes, minimum is {}",
                sealed.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::decryption_failed("authentication failed"))
    }
}

impl<C: Codec> Codec for EncryptedCodec<C> {
    fn marshal<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let plaintext = self.inner.marshal(value)?;
        self.seal(&plaintext)
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        let plaintext = self.open(bytes)?;
        self.inner.unmarshal(&plaintext)
    }

    fn name(&self) -> &'static str {
        "encrypted"
    }
}

impl<C: Codec + std::fmt::Debug> std::fmt::Debug for EncryptedCodec<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCodec")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}
