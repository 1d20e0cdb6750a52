//! Implementation of the ZipCrypto algorithm
//!
//! The legacy PKWARE encryption. It is weak and only kept for reading and
//! writing archives that require it.

use std::num::Wrapping;

use crate::result::{ZipError, ZipResult};

/// Size of the encryption header preceding the payload.
pub const HEADER_LENGTH: usize = 12;

/// A single keystore instance
#[derive(Clone, Copy)]
struct ZipCryptoKeys {
    key_0: Wrapping<u32>,
    key_1: Wrapping<u32>,
    key_2: Wrapping<u32>,
}

impl std::fmt::Debug for ZipCryptoKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ZipCryptoKeys(..)")
    }
}

impl ZipCryptoKeys {
    fn new(password: &[u8]) -> ZipCryptoKeys {
        let mut keys = ZipCryptoKeys {
            key_0: Wrapping(0x12345678),
            key_1: Wrapping(0x23456789),
            key_2: Wrapping(0x34567890),
        };
        for &byte in password {
            keys.update(byte);
        }
        keys
    }

    fn update(&mut self, input: u8) {
        self.key_0 = crc32_update(self.key_0, input);
        self.key_1 = (self.key_1 + (self.key_0 & Wrapping(0xff))) * Wrapping(0x08088405) + Wrapping(1);
        self.key_2 = crc32_update(self.key_2, (self.key_1 >> 24).0 as u8);
    }

    fn stream_byte(&self) -> u8 {
        let temp: Wrapping<u16> = Wrapping(self.key_2.0 as u16) | Wrapping(2);
        ((temp * (temp ^ Wrapping(1))) >> 8).0 as u8
    }

    fn decrypt_byte(&mut self, cipher_byte: u8) -> u8 {
        let plain_byte = self.stream_byte() ^ cipher_byte;
        self.update(plain_byte);
        plain_byte
    }

    fn encrypt_byte(&mut self, plain_byte: u8) -> u8 {
        let cipher_byte = self.stream_byte() ^ plain_byte;
        self.update(plain_byte);
        cipher_byte
    }
}

/// One byte of the reflected CRC-32 without the usual pre and post inversion.
fn crc32_update(crc: Wrapping<u32>, input: u8) -> Wrapping<u32> {
    let mut hasher = crc32fast::Hasher::new_with_initial(!crc.0);
    hasher.update(&[input]);
    Wrapping(!hasher.finalize())
}

/// Encryption state of one legacy-encrypted entry.
#[derive(Debug)]
pub struct ZipCryptoStream {
    keys: ZipCryptoKeys,
}

impl ZipCryptoStream {
    /// Starts encrypting. Returns the header to write before the payload,
    /// ending in the two bytes of `verifier`.
    pub fn encrypt(password: &[u8], verifier: u16) -> ZipResult<(ZipCryptoStream, [u8; HEADER_LENGTH])> {
        check_password(password)?;
        let mut header = [0u8; HEADER_LENGTH];
        getrandom::getrandom(&mut header[..HEADER_LENGTH - 2]).map_err(|e| ZipError::Io(e.into()))?;
        header[HEADER_LENGTH - 2] = (verifier >> 8) as u8;
        header[HEADER_LENGTH - 1] = verifier as u8;
        let mut keys = ZipCryptoKeys::new(password);
        for byte in header.iter_mut() {
            *byte = keys.encrypt_byte(*byte);
        }
        Ok((ZipCryptoStream { keys }, header))
    }

    /// Starts decrypting from the header read before the payload. Only the
    /// last header byte can be checked against `verifier`.
    pub fn decrypt(password: &[u8], header: [u8; HEADER_LENGTH], verifier: u16) -> ZipResult<ZipCryptoStream> {
        check_password(password)?;
        let mut keys = ZipCryptoKeys::new(password);
        let mut plain = header;
        for byte in plain.iter_mut() {
            *byte = keys.decrypt_byte(*byte);
        }
        if plain[HEADER_LENGTH - 1] != verifier as u8 {
            return Err(ZipError::InvalidPassword);
        }
        Ok(ZipCryptoStream { keys })
    }

    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.keys.encrypt_byte(*byte);
        }
    }

    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.keys.decrypt_byte(*byte);
        }
    }
}

fn check_password(password: &[u8]) -> ZipResult<()> {
    if password.len() > crate::aes::MAX_PASSWORD_LENGTH {
        return Err(ZipError::CapacityExceeded("password is too long"));
    }
    Ok(())
}
