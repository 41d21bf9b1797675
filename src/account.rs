use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version byte prefixed to address preimages.
pub const ADDRESS_VERSION: u8 = 1;

/// Length of the address hash in bytes.
pub const ADDRESS_HASH_LENGTH: usize = 20;

/// An ed25519 public key identifying an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn from_base58(s: &str) -> Result<Self, String> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| format!("invalid base58 public key: {}", e))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "public key must be 32 bytes".to_string())?;
        Ok(PublicKey(arr))
    }

    /// Address derived from this key: base58 of the truncated sha256 over
    /// a version byte plus the key bytes.
    pub fn address(&self) -> Address {
        let mut hasher = Sha256::new();
        hasher.update([ADDRESS_VERSION]);
        hasher.update(self.0);
        let digest = hasher.finalize();
        let mut hash = [0u8; ADDRESS_HASH_LENGTH];
        hash.copy_from_slice(&digest[..ADDRESS_HASH_LENGTH]);
        Address(hash)
    }

    /// Verify an ed25519 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        key.verify(message, &Signature::from_bytes(&sig_bytes)).is_ok()
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// A base58-rendered account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_HASH_LENGTH]);

impl Address {
    pub fn from_base58(s: &str) -> Result<Self, String> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| format!("invalid base58 address: {}", e))?;
        let arr: [u8; ADDRESS_HASH_LENGTH] = bytes
            .try_into()
            .map_err(|_| format!("address must be {} bytes", ADDRESS_HASH_LENGTH))?;
        Ok(Address(arr))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// A proof attached to an order: either an ed25519 signature or an
/// argument consumed by an account script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(pub Vec<u8>);

/// The matcher wallet. Signs emitted exchange transactions.
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        KeyPair {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    pub fn from_hex_seed(hex_seed: &str) -> Result<Self, String> {
        let bytes = hex::decode(hex_seed).map_err(|e| format!("invalid hex seed: {}", e))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "seed must be 32 bytes".to_string())?;
        Ok(Self::from_seed(seed))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}
