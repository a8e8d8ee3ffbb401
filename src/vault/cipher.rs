//! AES-256-CBC encryption of individual credential values.
//!
//! An encrypted value is `base64(IV || ciphertext)`: a fresh random 16-byte
//! IV followed by the PKCS7-padded CBC ciphertext, encoded with the standard
//! padded base64 alphabet.
//!
//! These functions are strict and report every failure. The error policy
//! callers actually see is applied one level up, see
//! [`FailurePolicy`](super::FailurePolicy).

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

use super::kdf::MasterKey;

/// AES block size, which is also the IV length.
pub const BLOCK_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Errors raised by encrypt/decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The value is not valid base64.
    #[error("value is not valid base64")]
    InvalidBase64,

    /// The decoded value is too short to hold an IV and one block.
    #[error("encrypted value truncated ({len} bytes)")]
    Truncated { len: usize },

    /// The ciphertext is not a whole number of blocks.
    #[error("ciphertext length {len} is not a multiple of the block size")]
    Misaligned { len: usize },

    /// Padding check failed, usually a wrong key or corrupted data.
    #[error("decryption failed: wrong key or corrupted data")]
    BadPadding,

    /// The decrypted bytes are not UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,

    /// Key or IV had the wrong length.
    #[error("invalid key or IV length")]
    InvalidLength,

    /// The system random source failed.
    #[error("failed to generate random IV")]
    Random,

    /// No key is available because the vault is locked.
    #[error("vault is locked")]
    Locked,
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
pub fn encrypt(plaintext: &str, key: &MasterKey) -> Result<String, CryptoError> {
    let mut iv = [0u8; BLOCK_SIZE];
    SystemRandom::new()
        .fill(&mut iv)
        .map_err(|_| CryptoError::Random)?;

    let encryptor = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|_| CryptoError::InvalidLength)?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut payload = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(payload))
}

/// Decrypts a value produced by [`encrypt`].
pub fn decrypt(value: &str, key: &MasterKey) -> Result<String, CryptoError> {
    let payload = STANDARD
        .decode(value)
        .map_err(|_| CryptoError::InvalidBase64)?;

    if payload.len() < BLOCK_SIZE * 2 {
        return Err(CryptoError::Truncated { len: payload.len() });
    }

    let (iv, ciphertext) = payload.split_at(BLOCK_SIZE);
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Misaligned {
            len: ciphertext.len(),
        });
    }

    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| CryptoError::InvalidLength)?;
    let plaintext = decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::BadPadding)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}
