use aes::Aes128;
use cipher::{block_padding::Pkcs7, BlockDecrypt, BlockEncrypt, KeyInit};
use rand_core::{OsRng, RngCore};
use rsa::{
    pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding},
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;
use thiserror::Error;

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 16;
pub const RSA_BITS: usize = 2048;

// OAEP with SHA-256 spends 2 * 32 + 2 bytes of the modulus on padding.
const RSA_MAX_PLAINTEXT: usize = RSA_BITS / 8 - 2 * 32 - 2;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid session key length {0}, expected {KEY_SIZE}")]
    InvalidKeyLength(usize),
    /// Also what decrypting with the wrong session key looks like.
    #[error("invalid padding or ciphertext length")]
    BadPadding,
    /// The padding was valid but the plaintext is not a layer.
    #[error("decrypted layer is corrupt")]
    CorruptLayer,
    #[error("malformed public key: {0}")]
    InvalidPublicKey(String),
    #[error("plaintext of {0} bytes does not fit one RSA-OAEP block")]
    MessageTooLong(usize),
    #[error("rsa: {0}")]
    Rsa(#[from] rsa::Error),
}

/// Block-level encryption used for onion layers.
pub trait SymmetricCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

// ECB: every block is encrypted on its own, PKCS#7 pads the tail.
impl SymmetricCipher for Aes128 {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.encrypt_padded_vec::<Pkcs7>(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::BadPadding);
        }
        self.decrypt_padded_vec::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::BadPadding)
    }
}

/// A per-hop symmetric session key, generated by the relay.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        SessionKey(key)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(SessionKey(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn cipher(&self) -> Aes128 {
        Aes128::new(&self.0.into())
    }

    /// Adds one layer of encryption.
    pub fn add_layer(&self, plaintext: &[u8]) -> Vec<u8> {
        self.cipher().encrypt(plaintext)
    }

    /// Peels one layer of encryption.
    pub fn peel_layer(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher().decrypt(ciphertext)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Generates a cryptographically random session key.
pub fn generate_session_key() -> SessionKey {
    SessionKey::generate()
}

/// Symmetric-encrypts `plaintext` under a raw key.
pub fn wrap(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(SessionKey::from_slice(key)?.add_layer(plaintext))
}

/// Symmetric-decrypts `ciphertext` under a raw key, rejecting invalid padding.
pub fn unwrap(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    SessionKey::from_slice(key)?.peel_layer(ciphertext)
}

/// Generates a fresh RSA keypair.
pub fn generate_key_pair() -> Result<(RsaPrivateKey, RsaPublicKey), CryptoError> {
    let private_key = RsaPrivateKey::new(&mut OsRng, RSA_BITS)?;
    let public_key = RsaPublicKey::from(&private_key);
    Ok((private_key, public_key))
}

/// Encrypts `plaintext` to a PEM encoded public key.
pub fn rsa_encrypt(public_key: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if plaintext.len() > RSA_MAX_PLAINTEXT {
        return Err(CryptoError::MessageTooLong(plaintext.len()));
    }
    let public_key = RsaPublicKey::from_public_key_pem(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    Ok(public_key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)?)
}

pub fn rsa_decrypt(private_key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(private_key.decrypt(Oaep::new::<Sha256>(), ciphertext)?)
}

/// The client's half of one hop's handshake: an RSA keypair generated for a
/// single CREATE and consumed by the matching reply.
pub struct ClientSecret {
    private_key: RsaPrivateKey,
    public_key: String,
}

impl ClientSecret {
    pub fn generate() -> Result<Self, CryptoError> {
        let (private_key, public_key) = generate_key_pair()?;
        let public_key = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Gets the PEM encoded public key to send in the CREATE.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Recovers the relay's session key, consuming the secret.
    pub fn session_key(self, encrypted: &[u8]) -> Result<SessionKey, CryptoError> {
        SessionKey::from_slice(&rsa_decrypt(&self.private_key, encrypted)?)
    }
}

/// Encrypts a relay's fresh session key to the client's public key.
pub fn seal_session_key(public_key: &str, session_key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    rsa_encrypt(public_key, session_key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_reverses_wrap() {
        let key = SessionKey::generate();
        let plaintext = b"the quick brown fox jumps over the lazy dog";

        let ciphertext = key.add_layer(plaintext);

        assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);
        assert_eq!(key.peel_layer(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn wrap_pads_aligned_input_with_a_full_block() {
        let key = SessionKey::generate();

        let ciphertext = key.add_layer(&[7u8; BLOCK_SIZE]);

        assert_eq!(ciphertext.len(), 2 * BLOCK_SIZE);
    }

    #[test]
    fn wrap_is_deterministic_per_key() {
        let key = [3u8; KEY_SIZE];

        assert_eq!(wrap(&key, b"same").unwrap(), wrap(&key, b"same").unwrap());
    }

    #[test]
    fn wrap_rejects_invalid_key_length() {
        let err = wrap(&[0u8; 15], b"data").unwrap_err();

        assert!(matches!(err, CryptoError::InvalidKeyLength(15)));
    }

    #[test]
    fn unwrap_rejects_invalid_padding() {
        let key = [9u8; KEY_SIZE];
        // A block that decrypts to all zeroes can never carry PKCS#7 padding.
        let mut block = cipher::generic_array::GenericArray::from([0u8; BLOCK_SIZE]);
        Aes128::new(&key.into()).encrypt_block(&mut block);

        let err = unwrap(&key, block.as_slice()).unwrap_err();

        assert!(matches!(err, CryptoError::BadPadding));
    }

    #[test]
    fn unwrap_rejects_partial_blocks() {
        let key = SessionKey::generate();
        let mut ciphertext = key.add_layer(b"payload");
        ciphertext.pop();

        assert!(matches!(key.peel_layer(&ciphertext), Err(CryptoError::BadPadding)));
        assert!(matches!(key.peel_layer(&[]), Err(CryptoError::BadPadding)));
    }

    #[test]
    fn session_key_survives_rsa_transport() {
        let secret = ClientSecret::generate().unwrap();
        let session_key = generate_session_key();

        let sealed = seal_session_key(secret.public_key(), &session_key).unwrap();

        assert_eq!(secret.session_key(&sealed).unwrap(), session_key);
    }

    #[test]
    fn rsa_encrypt_rejects_malformed_public_key() {
        let err = rsa_encrypt("not a key", b"data").unwrap_err();

        assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
    }

    #[test]
    fn rsa_encrypt_rejects_oversized_plaintext() {
        let secret = ClientSecret::generate().unwrap();

        let err = rsa_encrypt(secret.public_key(), &[0u8; 191]).unwrap_err();

        assert!(matches!(err, CryptoError::MessageTooLong(191)));
    }

    #[test]
    fn rsa_decrypt_fails_with_other_private_key() {
        let (_, public_key) = generate_key_pair().unwrap();
        let (other_private, _) = generate_key_pair().unwrap();
        let pem = public_key.to_public_key_pem(LineEnding::LF).unwrap();

        let ciphertext = rsa_encrypt(&pem, b"secret").unwrap();

        assert!(rsa_decrypt(&other_private, &ciphertext).is_err());
    }
}
