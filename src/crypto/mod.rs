//! Stream-cipher support for connection obfuscation
//!
//! Both legs of an obfuscated hop are terminated by this daemon, so the
//! ciphers only need to agree with themselves: keys are derived from the
//! shared password by MD5 chaining, and the IV/nonce material is fixed.
//! Read and write directions get independent cipher state so concurrent
//! traffic cannot desynchronize the keystream.

mod stream;

pub use stream::CipherStream;

use cfb_mode::{BufDecryptor, BufEncryptor};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use des::Des;
use rc4::consts::U16;
use rc4::{KeyInit, Rc4};

use crate::error::{Error, Result};

/// Fixed IV for DES-CFB, shared by both ends.
const DES_IV: [u8; 8] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];

/// Fixed nonce for ChaCha20; uniqueness comes from per-deployment passwords.
const CHACHA20_NONCE: [u8; 12] = [0u8; 12];

/// One direction of a keystream cipher.
pub(crate) trait Transform: Send {
    fn apply(&mut self, data: &mut [u8]);
}

struct Rc4Transform(Rc4<U16>);

impl Transform for Rc4Transform {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

struct ChaCha20Transform(ChaCha20);

impl Transform for ChaCha20Transform {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

// CFB feeds ciphertext back into the block cipher, so unlike RC4/ChaCha20
// the encrypt and decrypt transforms are distinct types.
struct DesCfbEncrypt(BufEncryptor<Des>);

impl Transform for DesCfbEncrypt {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.encrypt(data);
    }
}

struct DesCfbDecrypt(BufDecryptor<Des>);

impl Transform for DesCfbDecrypt {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.decrypt(data);
    }
}

/// Derive `len` key bytes from a password by MD5 chaining
/// (the classic EVP_BytesToKey shape, no salt).
pub fn derive_key(password: &[u8], len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(len + 15);
    let mut prev: Option<md5::Digest> = None;

    while key.len() < len {
        let digest = match prev {
            Some(d) => {
                let mut input = Vec::with_capacity(16 + password.len());
                input.extend_from_slice(&d.0);
                input.extend_from_slice(password);
                md5::compute(&input)
            }
            None => md5::compute(password),
        };
        key.extend_from_slice(&digest.0);
        prev = Some(digest);
    }

    key.truncate(len);
    key
}

/// Build the (read, write) transform pair for a method, or `None` for the
/// pass-through case (empty or unrecognized method).
pub(crate) fn make_transforms(
    method: &str,
    password: &[u8],
) -> Result<Option<(Box<dyn Transform>, Box<dyn Transform>)>> {
    match method {
        "rc4" => {
            let key = derive_key(password, 16);
            let read = Rc4::<U16>::new_from_slice(&key)
                .map_err(|e| Error::Crypto(format!("rc4 key: {}", e)))?;
            let write = Rc4::<U16>::new_from_slice(&key)
                .map_err(|e| Error::Crypto(format!("rc4 key: {}", e)))?;
            Ok(Some((
                Box::new(Rc4Transform(read)),
                Box::new(Rc4Transform(write)),
            )))
        }
        "des" => {
            let key = derive_key(password, 8);
            let read = BufDecryptor::<Des>::new_from_slices(&key, &DES_IV)
                .map_err(|e| Error::Crypto(format!("des key: {}", e)))?;
            let write = BufEncryptor::<Des>::new_from_slices(&key, &DES_IV)
                .map_err(|e| Error::Crypto(format!("des key: {}", e)))?;
            Ok(Some((
                Box::new(DesCfbDecrypt(read)),
                Box::new(DesCfbEncrypt(write)),
            )))
        }
        "chacha20" => {
            let key = derive_key(password, 32);
            let read = ChaCha20::new_from_slices(&key, &CHACHA20_NONCE)
                .map_err(|e| Error::Crypto(format!("chacha20 key: {}", e)))?;
            let write = ChaCha20::new_from_slices(&key, &CHACHA20_NONCE)
                .map_err(|e| Error::Crypto(format!("chacha20 key: {}", e)))?;
            Ok(Some((
                Box::new(ChaCha20Transform(read)),
                Box::new(ChaCha20Transform(write)),
            )))
        }
        _ => Ok(None),
    }
}
