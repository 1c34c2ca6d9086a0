//! AES-256-GCM with a 16-byte IV and 128-bit tag
//!
//! The IV, ciphertext and tag are all covered by GCM authentication, so a
//! change to any of them fails `open`.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;

use super::ciphertext::{SealedBox, IV_LENGTH, TAG_LENGTH};
use super::error::DecryptionError;
use super::keyring::KeyMaterial;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

fn cipher_for(key: &KeyMaterial) -> Aes256Gcm16 {
    Aes256Gcm16::new(key.as_bytes().into())
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
pub fn seal(key: &KeyMaterial, plaintext: &[u8]) -> SealedBox {
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    let mut data = plaintext.to_vec();
    let tag = cipher_for(key)
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut data)
        .expect("AES-GCM can encrypt messages below 64 GiB");

    let mut tag_bytes = [0u8; TAG_LENGTH];
    tag_bytes.copy_from_slice(&tag);

    SealedBox {
        iv,
        data,
        tag: tag_bytes,
    }
}

/// Decrypt and authenticate a sealed box under `key`.
pub fn open(key: &KeyMaterial, sealed: &SealedBox) -> Result<Vec<u8>, DecryptionError> {
    let mut data = sealed.data.clone();
    cipher_for(key)
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(&sealed.iv),
            b"",
            &mut data,
            Tag::<U16>::from_slice(&sealed.tag),
        )
        .map_err(|_| DecryptionError::AuthenticationFailed)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> KeyMaterial {
        KeyMaterial::from_bytes([byte; 32])
    }

    #[test]
    fn test_seal_open() {
        let sealed = seal(&key(7), b"hello world");
        assert_eq!(open(&key(7), &sealed).unwrap(), b"hello world");
        assert_eq!(sealed.data.len(), 11);
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let a = seal(&key(7), b"same");
        let b = seal(&key(7), b"same");
        assert_ne!(a.iv, b.iv);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&key(7), b"secret");
        assert_eq!(
            open(&key(8), &sealed).unwrap_err(),
            DecryptionError::AuthenticationFailed
        );
    }

    #[test]
    fn test_each_segment_is_authenticated() {
        let sealed = seal(&key(1), b"payload");

        for i in 0..sealed.iv.len() {
            let mut tampered = sealed.clone();
            tampered.iv[i] ^= 0x01;
            assert!(open(&key(1), &tampered).is_err(), "iv byte {}", i);
        }
        for i in 0..sealed.data.len() {
            let mut tampered = sealed.clone();
            tampered.data[i] ^= 0x01;
            assert!(open(&key(1), &tampered).is_err(), "data byte {}", i);
        }
        for i in 0..sealed.tag.len() {
            let mut tampered = sealed.clone();
            tampered.tag[i] ^= 0x80;
            assert!(open(&key(1), &tampered).is_err(), "tag byte {}", i);
        }
    }
}
