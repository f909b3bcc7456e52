use aes_gcm::{
    aead::{rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use crate::{Result, Error};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const KEY_INFO: &[u8] = b"ember-store-envelope-v1";

/// Derives a 256-bit cipher key from a passphrase and a per-payload salt.
fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), passphrase.as_bytes());
    let mut key = [0u8; KEY_LEN];
    hk.expand(KEY_INFO, &mut key)
        .map_err(|e| Error::Internal(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

/// Encrypts `plaintext` with AES-256-GCM under a key derived from `passphrase`.
///
/// Returns a hex-encoded string containing the salt, the nonce and the ciphertext,
/// in that order. Salt and nonce are fresh random values on every call.
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(passphrase, &salt)?;

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Internal(e.to_string()))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng); // 96 bits / 12 bytes
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Internal(e.to_string()))?;

    let mut combined = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(hex::encode(combined))
}

/// Decrypts the output of [`encrypt`].
///
/// Any failure (bad hex, short input, wrong passphrase, tampering) is reported as
/// [`Error::DecryptionFailure`].
pub fn decrypt(cipher_hex: &str, passphrase: &str) -> Result<Vec<u8>> {
    let combined = hex::decode(cipher_hex.trim()).map_err(|_| Error::DecryptionFailure)?;
    if combined.len() < SALT_LEN + NONCE_LEN {
        return Err(Error::DecryptionFailure);
    }

    let (salt, rest) = combined.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
    let key = derive_key(passphrase, salt)?;

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Internal(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| Error::DecryptionFailure)
}
