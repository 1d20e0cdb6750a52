//! WinZip AES encryption of entry payloads.
//!
//! An AES encrypted entry starts with a salt, whose length depends on the
//! key size, followed by a 2 byte password verification value, then the
//! encrypted data and lastly a 10 byte authentication code.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::aes_ctr::{self, AesCipher, AesCtrZipKeyStream};
use crate::result::{ZipError, ZipResult};
use crate::types::AesMode;

/// The length of the password verifcation value in bytes
pub const PWD_VERIFY_LENGTH: usize = 2;
/// The length of the authentication code in bytes
pub const AUTH_CODE_LENGTH: usize = 10;
/// Longest accepted password.
pub const MAX_PASSWORD_LENGTH: usize = 128;
/// The number of iterations used with PBKDF2
const ITERATION_COUNT: u32 = 1000;

type HmacSha1 = Hmac<Sha1>;

/// Bytes an encrypted payload carries besides the ciphertext.
pub fn overhead(mode: AesMode) -> u64 {
    (mode.salt_length() + PWD_VERIFY_LENGTH + AUTH_CODE_LENGTH) as u64
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Uninitialized,
    Keyed,
    Streaming,
    Finalized,
}

/// Encryption state of one entry.
///
/// A stream gets a password, is keyed from a salt (fresh when encrypting,
/// read from the entry when decrypting), transforms the payload in place and
/// is finalized with the authentication code.
pub struct AesStream {
    mode: AesMode,
    state: State,
    password: Vec<u8>,
    cipher: Option<Box<dyn AesCipher>>,
    mac: Option<HmacSha1>,
}

impl std::fmt::Debug for AesStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesStream")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish()
    }
}

impl AesStream {
    pub fn new(mode: AesMode, password: &[u8]) -> ZipResult<AesStream> {
        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(ZipError::CapacityExceeded("password is too long"));
        }
        Ok(AesStream {
            mode,
            state: State::Uninitialized,
            password: password.to_vec(),
            cipher: None,
            mac: None,
        })
    }

    pub fn mode(&self) -> AesMode {
        self.mode
    }

    /// Keys the stream for writing. Returns the salt and verifier that must
    /// precede the ciphertext.
    pub fn start_encrypt(&mut self) -> ZipResult<Vec<u8>> {
        let mut salt = vec![0; self.mode.salt_length()];
        getrandom::getrandom(&mut salt).map_err(|e| ZipError::Io(e.into()))?;
        let verifier = self.derive(&salt)?;
        salt.extend_from_slice(&verifier);
        Ok(salt)
    }

    /// Keys the stream for reading from the salt and verifier found in the entry.
    ///
    /// A verifier that does not match the password fails right away.
    pub fn start_decrypt(&mut self, salt: &[u8], verifier: [u8; PWD_VERIFY_LENGTH]) -> ZipResult<()> {
        if salt.len() != self.mode.salt_length() {
            return Err(ZipError::InvalidArchive("AES salt has the wrong length"));
        }
        if self.derive(salt)? != verifier {
            self.state = State::Uninitialized;
            self.cipher = None;
            self.mac = None;
            return Err(ZipError::InvalidPassword);
        }
        Ok(())
    }

    fn derive(&mut self, salt: &[u8]) -> ZipResult<[u8; PWD_VERIFY_LENGTH]> {
        if self.state != State::Uninitialized {
            return Err(ZipError::InvalidState("AES stream is already keyed"));
        }
        let key_length = self.mode.key_length();
        // encryption key, authentication key, verifier
        let mut derived_key = vec![0; 2 * key_length + PWD_VERIFY_LENGTH];
        pbkdf2::pbkdf2_hmac::<Sha1>(&self.password, salt, ITERATION_COUNT, &mut derived_key);

        let encryption_key = &derived_key[..key_length];
        let cipher: Box<dyn AesCipher> = match self.mode {
            AesMode::Aes128 => Box::new(AesCtrZipKeyStream::<aes_ctr::Aes128>::new(
                array_ref(encryption_key)?,
            )),
            AesMode::Aes192 => Box::new(AesCtrZipKeyStream::<aes_ctr::Aes192>::new(
                array_ref(encryption_key)?,
            )),
            AesMode::Aes256 => Box::new(AesCtrZipKeyStream::<aes_ctr::Aes256>::new(
                array_ref(encryption_key)?,
            )),
        };
        let mac = <HmacSha1 as Mac>::new_from_slice(&derived_key[key_length..2 * key_length])
            .map_err(|_| ZipError::InvalidState("invalid AES authentication key"))?;

        self.cipher = Some(cipher);
        self.mac = Some(mac);
        self.state = State::Keyed;
        let mut verifier = [0; PWD_VERIFY_LENGTH];
        verifier.copy_from_slice(&derived_key[2 * key_length..]);
        Ok(verifier)
    }

    /// Encrypts plaintext in place; the code authenticates the ciphertext.
    pub fn encrypt(&mut self, buf: &mut [u8]) -> ZipResult<()> {
        let (cipher, mac) = self.streaming()?;
        cipher.crypt_in_place(buf);
        mac.update(buf);
        Ok(())
    }

    /// Decrypts ciphertext in place.
    pub fn decrypt(&mut self, buf: &mut [u8]) -> ZipResult<()> {
        let (cipher, mac) = self.streaming()?;
        mac.update(buf);
        cipher.crypt_in_place(buf);
        Ok(())
    }

    fn streaming(&mut self) -> ZipResult<(&mut Box<dyn AesCipher>, &mut HmacSha1)> {
        match self.state {
            State::Keyed | State::Streaming => self.state = State::Streaming,
            State::Uninitialized => return Err(ZipError::InvalidState("AES stream is not keyed")),
            State::Finalized => return Err(ZipError::InvalidState("AES stream is finalized")),
        }
        match (self.cipher.as_mut(), self.mac.as_mut()) {
            (Some(cipher), Some(mac)) => Ok((cipher, mac)),
            _ => Err(ZipError::InvalidState("AES stream is not keyed")),
        }
    }

    /// Ends the payload and returns the authentication code to append.
    pub fn finish(&mut self) -> ZipResult<[u8; AUTH_CODE_LENGTH]> {
        if !matches!(self.state, State::Keyed | State::Streaming) {
            return Err(ZipError::InvalidState("AES stream is not keyed"));
        }
        let mac = self
            .mac
            .take()
            .ok_or(ZipError::InvalidState("AES stream is not keyed"))?;
        self.cipher = None;
        self.state = State::Finalized;
        let code = mac.finalize().into_bytes();
        let mut tag = [0; AUTH_CODE_LENGTH];
        tag.copy_from_slice(&code[..AUTH_CODE_LENGTH]);
        Ok(tag)
    }

    /// Ends the payload and checks the authentication code read after it.
    pub fn verify(&mut self, stored: &[u8]) -> ZipResult<()> {
        if !matches!(self.state, State::Keyed | State::Streaming) {
            return Err(ZipError::InvalidState("AES stream is not keyed"));
        }
        let mac = self
            .mac
            .take()
            .ok_or(ZipError::InvalidState("AES stream is not keyed"))?;
        self.cipher = None;
        self.state = State::Finalized;
        if stored.len() != AUTH_CODE_LENGTH {
            return Err(ZipError::AuthenticationFailed);
        }
        // compares in constant time
        mac.verify_truncated_left(stored)
            .map_err(|_| ZipError::AuthenticationFailed)
    }
}

fn array_ref<const N: usize>(key: &[u8]) -> ZipResult<&[u8; N]> {
    key.try_into()
        .map_err(|_| ZipError::InvalidState("derived AES key has the wrong length"))
}

#[cfg(test)]
mod test {
    use super::*;

    fn seal(mode: AesMode, password: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let mut stream = AesStream::new(mode, password).unwrap();
        let mut out = stream.start_encrypt().unwrap();
        let mut payload = plaintext.to_vec();
        stream.encrypt(&mut payload).unwrap();
        out.extend_from_slice(&payload);
        out.extend_from_slice(&stream.finish().unwrap());
        out
    }

    fn open(mode: AesMode, password: &[u8], sealed: &[u8]) -> ZipResult<Vec<u8>> {
        let salt_len = mode.salt_length();
        let mut stream = AesStream::new(mode, password)?;
        let verifier = [sealed[salt_len], sealed[salt_len + 1]];
        stream.start_decrypt(&sealed[..salt_len], verifier)?;
        let mut payload = sealed[salt_len + 2..sealed.len() - AUTH_CODE_LENGTH].to_vec();
        stream.decrypt(&mut payload)?;
        stream.verify(&sealed[sealed.len() - AUTH_CODE_LENGTH..])?;
        Ok(payload)
    }

    #[test]
    fn every_key_size_round_trips() {
        for mode in [AesMode::Aes128, AesMode::Aes192, AesMode::Aes256] {
            let sealed = seal(mode, b"secret", b"some plaintext");
            assert_eq!(sealed.len() as u64, 14 + overhead(mode));
            assert_eq!(open(mode, b"secret", &sealed).unwrap(), b"some plaintext");
        }
    }

    #[test]
    fn wrong_password_fails_at_the_verifier() {
        let sealed = seal(AesMode::Aes256, b"secret", b"data");
        assert!(matches!(
            open(AesMode::Aes256, b"Secret", &sealed),
            Err(ZipError::InvalidPassword)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let mut sealed = seal(AesMode::Aes128, b"pw", b"payload bytes");
        let index = AesMode::Aes128.salt_length() + 2 + 3;
        sealed[index] ^= 0x01;
        assert!(matches!(
            open(AesMode::Aes128, b"pw", &sealed),
            Err(ZipError::AuthenticationFailed)
        ));
    }

    #[test]
    fn state_is_enforced() {
        let mut stream = AesStream::new(AesMode::Aes256, b"pw").unwrap();
        assert!(matches!(
            stream.encrypt(&mut [0; 4]),
            Err(ZipError::InvalidState(_))
        ));
        stream.start_encrypt().unwrap();
        stream.finish().unwrap();
        assert!(matches!(
            stream.encrypt(&mut [0; 4]),
            Err(ZipError::InvalidState(_))
        ));
    }

    #[test]
    fn long_passwords_are_refused() {
        assert!(matches!(
            AesStream::new(AesMode::Aes256, &[b'x'; 129]),
            Err(ZipError::CapacityExceeded(_))
        ));
    }
}
