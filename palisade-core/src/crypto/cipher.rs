//! AES-256-GCM encryption for entity blobs.
//!
//! Every blob is self-describing: a fresh random 96-bit nonce is generated
//! per call and prepended to the ciphertext, and the cipher appends a
//! 16-byte authentication tag. Decrypting with the wrong key, or any
//! tampering with nonce, body, or tag, fails closed with
//! [`CryptoError::WrongKey`] and never yields garbage plaintext.

use crate::crypto::{CryptoError, DerivedKey, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

/// Nonce length in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag length in bytes
pub const TAG_SIZE: usize = 16;

/// Encrypt a payload under the given key.
///
/// Returns `nonce || ciphertext || tag` as one opaque blob. Works for any
/// payload, including empty ones.
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Primitive(format!("encryption failed: {e}")))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// A blob too short to contain a nonce and tag is treated the same as an
/// authentication failure.
pub fn decrypt(blob: &[u8], key: &DerivedKey) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::WrongKey);
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::WrongKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> DerivedKey {
        DerivedKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key(1);
        let plaintext = b"super secret credential";

        let blob = encrypt(plaintext, &key).unwrap();
        let decrypted = decrypt(&blob, &key).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_ne!(&blob[NONCE_SIZE..], plaintext.as_slice());
    }

    #[test]
    fn test_empty_payload_roundtrips() {
        let key = test_key(2);

        let blob = encrypt(b"", &key).unwrap();
        assert_eq!(blob.len(), NONCE_SIZE + TAG_SIZE);
        assert_eq!(decrypt(&blob, &key).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_each_encryption_uses_fresh_nonce() {
        let key = test_key(3);

        let blob1 = encrypt(b"same payload", &key).unwrap();
        let blob2 = encrypt(b"same payload", &key).unwrap();

        assert_ne!(blob1[..NONCE_SIZE], blob2[..NONCE_SIZE]);
        assert_ne!(blob1, blob2);
    }

    #[test]
    fn test_wrong_key_fails_deterministically() {
        let blob = encrypt(b"payload", &test_key(4)).unwrap();

        let result = decrypt(&blob, &test_key(5));
        assert!(matches!(result, Err(CryptoError::WrongKey)));
    }

    #[test]
    fn test_tampering_is_detected() {
        let key = test_key(6);
        let blob = encrypt(b"integrity matters", &key).unwrap();

        // Flip one byte in the nonce, the body, and the tag in turn.
        for index in [0, NONCE_SIZE + 1, blob.len() - 1] {
            let mut tampered = blob.clone();
            tampered[index] ^= 0x01;
            assert!(matches!(decrypt(&tampered, &key), Err(CryptoError::WrongKey)));
        }
    }

    #[test]
    fn test_truncated_blob_is_wrong_key() {
        let key = test_key(7);
        let blob = encrypt(b"short", &key).unwrap();

        assert!(matches!(decrypt(&[], &key), Err(CryptoError::WrongKey)));
        assert!(matches!(decrypt(&blob[..5], &key), Err(CryptoError::WrongKey)));
        assert!(matches!(
            decrypt(&blob[..NONCE_SIZE + TAG_SIZE - 1], &key),
            Err(CryptoError::WrongKey)
        ));
    }
}
