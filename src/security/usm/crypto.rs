//! USM cryptographic primitives: key localisation, HMAC authentication,
//! and symmetric privacy (RFC 3414 §2.6, §6, §7, §8).

use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::{Error, Result};

/// `usmHMACMD5AuthProtocol` / `usmHMACSHAAuthProtocol` (RFC 3414 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthProtocol {
    HmacMd5,
    HmacSha1,
}

/// `usmDESPrivProtocol`, RFC 3414bis's 3DES extension, and the AES-CFB
/// variants defined by RFC 3826 (spec.md §1 names all four).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivProtocol {
    Des,
    TripleDes,
    Aes128,
    Aes192,
    Aes256,
}

impl PrivProtocol {
    pub fn key_len(self) -> usize {
        match self {
            // RFC 3414 §8.1.1.1: the localized key is 16 octets, the
            // first 8 the DES key itself and the last 8 XORed with the
            // salt to form the pre-IV.
            PrivProtocol::Des => 16,
            PrivProtocol::TripleDes => 24,
            PrivProtocol::Aes128 => 16,
            PrivProtocol::Aes192 => 24,
            PrivProtocol::Aes256 => 32,
        }
    }
}

const EXPANSION_LEN: usize = 1_048_576;
const AUTH_MAC_LEN: usize = 12;

fn expand_password(password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![0u8; EXPANSION_LEN];
    }
    let mut buf = Vec::with_capacity(EXPANSION_LEN);
    while buf.len() < EXPANSION_LEN {
        let remaining = EXPANSION_LEN - buf.len();
        let take = remaining.min(password.len());
        buf.extend_from_slice(&password[..take]);
    }
    buf
}

fn digest(protocol: AuthProtocol, data: &[u8]) -> Vec<u8> {
    match protocol {
        AuthProtocol::HmacMd5 => {
            use md5::Digest;
            Md5::digest(data).to_vec()
        }
        AuthProtocol::HmacSha1 => {
            use sha1::Digest;
            Sha1::digest(data).to_vec()
        }
    }
}

/// RFC 3414 §2.6: `Ku = H(expand(password))`, then
/// `Kul = H(Ku || engineID || Ku)`.
pub fn localize_key(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Vec<u8> {
    let expanded = expand_password(password);
    let ku = digest(protocol, &expanded);

    let mut combined = Vec::with_capacity(ku.len() * 2 + engine_id.len());
    combined.extend_from_slice(&ku);
    combined.extend_from_slice(engine_id);
    combined.extend_from_slice(&ku);

    digest(protocol, &combined)
}

/// HMAC-MD5-96 / HMAC-SHA-96: full HMAC truncated to the first 12
/// octets (RFC 3414 §6.3.1, §7.3.1).
pub fn authenticate(protocol: AuthProtocol, key: &[u8], message: &[u8]) -> Result<[u8; AUTH_MAC_LEN]> {
    let full = match protocol {
        AuthProtocol::HmacMd5 => {
            let mut mac = Hmac::<Md5>::new_from_slice(key)
                .map_err(|e| Error::usm(format!("invalid HMAC-MD5 key: {}", e)))?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        AuthProtocol::HmacSha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key)
                .map_err(|e| Error::usm(format!("invalid HMAC-SHA1 key: {}", e)))?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    };
    let mut out = [0u8; AUTH_MAC_LEN];
    out.copy_from_slice(&full[..AUTH_MAC_LEN]);
    Ok(out)
}

/// Constant-time comparison of the received MAC against a freshly
/// computed one (spec.md P5, RFC 3414 §6.3.2 step 3).
pub fn verify_mac(expected: &[u8], received: &[u8]) -> bool {
    expected.len() == received.len() && bool::from(expected.ct_eq(received))
}

/// DES-CBC encryption (RFC 3414 §8.1.1). `salt` is the 8-octet
/// `msgPrivacyParameters`; the IV is `salt XOR privKey[8..16]`.
fn des_iv(priv_key: &[u8], salt: &[u8; 8]) -> [u8; 8] {
    let mut iv = [0u8; 8];
    for i in 0..8 {
        iv[i] = salt[i] ^ priv_key[8 + i];
    }
    iv
}

/// AES-CFB IV (RFC 3826 §3.1.2.1): `engineBoots(4) || engineTime(4) || salt(8)`.
fn aes_iv(engine_boots: u32, engine_time: u32, salt: &[u8; 8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[0..4].copy_from_slice(&engine_boots.to_be_bytes());
    iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
    iv[8..16].copy_from_slice(salt);
    iv
}

pub fn encrypt(
    protocol: PrivProtocol,
    priv_key: &[u8],
    salt: &[u8; 8],
    engine_boots: u32,
    engine_time: u32,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    if priv_key.len() < protocol.key_len() {
        return Err(Error::usm("privacy key shorter than protocol requires"));
    }
    match protocol {
        PrivProtocol::Des => {
            let iv = des_iv(priv_key, salt);
            let cipher = cbc::Encryptor::<des::Des>::new(priv_key[..8].into(), (&iv).into());
            Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
        }
        PrivProtocol::TripleDes => {
            let iv = des_iv(priv_key, salt);
            let cipher =
                cbc::Encryptor::<des::TdesEde3>::new(priv_key[..24].into(), (&iv).into());
            Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
        }
        PrivProtocol::Aes128 => {
            let iv = aes_iv(engine_boots, engine_time, salt);
            let mut cipher =
                cfb_mode::Encryptor::<aes::Aes128>::new(priv_key[..16].into(), (&iv).into());
            let mut buf = plaintext.to_vec();
            cipher.apply_keystream(&mut buf);
            Ok(buf)
        }
        PrivProtocol::Aes192 => {
            let iv = aes_iv(engine_boots, engine_time, salt);
            let mut cipher =
                cfb_mode::Encryptor::<aes::Aes192>::new(priv_key[..24].into(), (&iv).into());
            let mut buf = plaintext.to_vec();
            cipher.apply_keystream(&mut buf);
            Ok(buf)
        }
        PrivProtocol::Aes256 => {
            let iv = aes_iv(engine_boots, engine_time, salt);
            let mut cipher =
                cfb_mode::Encryptor::<aes::Aes256>::new(priv_key[..32].into(), (&iv).into());
            let mut buf = plaintext.to_vec();
            cipher.apply_keystream(&mut buf);
            Ok(buf)
        }
    }
}

pub fn decrypt(
    protocol: PrivProtocol,
    priv_key: &[u8],
    salt: &[u8; 8],
    engine_boots: u32,
    engine_time: u32,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if priv_key.len() < protocol.key_len() {
        return Err(Error::usm("privacy key shorter than protocol requires"));
    }
    match protocol {
        PrivProtocol::Des => {
            if ciphertext.len() % 8 != 0 {
                return Err(Error::usm("DES ciphertext not a multiple of block size"));
            }
            let iv = des_iv(priv_key, salt);
            let cipher = cbc::Decryptor::<des::Des>::new(priv_key[..8].into(), (&iv).into());
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| Error::usm("DES decryption padding error"))
        }
        PrivProtocol::TripleDes => {
            if ciphertext.len() % 8 != 0 {
                return Err(Error::usm("3DES ciphertext not a multiple of block size"));
            }
            let iv = des_iv(priv_key, salt);
            let cipher =
                cbc::Decryptor::<des::TdesEde3>::new(priv_key[..24].into(), (&iv).into());
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| Error::usm("3DES decryption padding error"))
        }
        PrivProtocol::Aes128 => {
            let iv = aes_iv(engine_boots, engine_time, salt);
            let mut cipher =
                cfb_mode::Decryptor::<aes::Aes128>::new(priv_key[..16].into(), (&iv).into());
            let mut buf = ciphertext.to_vec();
            cipher.apply_keystream(&mut buf);
            Ok(buf)
        }
        PrivProtocol::Aes192 => {
            let iv = aes_iv(engine_boots, engine_time, salt);
            let mut cipher =
                cfb_mode::Decryptor::<aes::Aes192>::new(priv_key[..24].into(), (&iv).into());
            let mut buf = ciphertext.to_vec();
            cipher.apply_keystream(&mut buf);
            Ok(buf)
        }
        PrivProtocol::Aes256 => {
            let iv = aes_iv(engine_boots, engine_time, salt);
            let mut cipher =
                cfb_mode::Decryptor::<aes::Aes256>::new(priv_key[..32].into(), (&iv).into());
            let mut buf = ciphertext.to_vec();
            cipher.apply_keystream(&mut buf);
            Ok(buf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localisation_is_deterministic() {
        let a = localize_key(AuthProtocol::HmacMd5, b"maplesyrup", b"\x80\x00\x00\x00\x01");
        let b = localize_key(AuthProtocol::HmacMd5, b"maplesyrup", b"\x80\x00\x00\x00\x01");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn localisation_depends_on_engine_id() {
        let a = localize_key(AuthProtocol::HmacSha1, b"maplesyrup", b"engine-a");
        let b = localize_key(AuthProtocol::HmacSha1, b"maplesyrup", b"engine-b");
        assert_ne!(a, b);
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn auth_mac_is_twelve_bytes_and_verifies() {
        let key = localize_key(AuthProtocol::HmacMd5, b"maplesyrup", b"\x80\x00\x00\x00\x01");
        let mac = authenticate(AuthProtocol::HmacMd5, &key, b"hello world").unwrap();
        assert_eq!(mac.len(), 12);
        assert!(verify_mac(&mac, &mac));
        let mut tampered = mac;
        tampered[0] ^= 0xFF;
        assert!(!verify_mac(&mac, &tampered));
    }

    #[test]
    fn aes128_round_trips() {
        let key = [0x11u8; 16];
        let salt = [0x22u8; 8];
        let plaintext = b"scopedPDU-bytes-here-1234567890";
        let ciphertext =
            encrypt(PrivProtocol::Aes128, &key, &salt, 5, 1000, plaintext).unwrap();
        let recovered =
            decrypt(PrivProtocol::Aes128, &key, &salt, 5, 1000, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn des_round_trips_with_padding() {
        let key = [0x33u8; 16];
        let salt = [0x44u8; 8];
        let plaintext = b"short";
        let ciphertext = encrypt(PrivProtocol::Des, &key, &salt, 0, 0, plaintext).unwrap();
        assert_eq!(ciphertext.len() % 8, 0);
        let recovered = decrypt(PrivProtocol::Des, &key, &salt, 0, 0, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn triple_des_round_trips() {
        let key = [0x55u8; 24];
        let salt = [0x66u8; 8];
        let plaintext = b"a slightly longer plaintext payload";
        let ciphertext = encrypt(PrivProtocol::TripleDes, &key, &salt, 1, 1, plaintext).unwrap();
        let recovered = decrypt(PrivProtocol::TripleDes, &key, &salt, 1, 1, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn aes256_round_trips() {
        let key = [0x77u8; 32];
        let salt = [0x88u8; 8];
        let plaintext = b"payload";
        let ciphertext =
            encrypt(PrivProtocol::Aes256, &key, &salt, 9, 42, plaintext).unwrap();
        let recovered =
            decrypt(PrivProtocol::Aes256, &key, &salt, 9, 42, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }
}
