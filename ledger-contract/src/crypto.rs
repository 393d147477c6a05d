//! Administrative signing credential
//!
//! One Ed25519 key pair represents the platform's administrative identity.
//! Every chain-mutating operation is signed with it; the chain address is
//! derived from the verifying key.

use crate::types::{Address, ChainOperation, Signature, SignedOperation};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// Ed25519 key pair holding the administrative credential
#[derive(Debug)]
pub struct AdminKeypair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl AdminKeypair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::from_bytes(&rand::random::<[u8; 32]>());
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from seed (32 bytes), deterministic
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Chain address derived from the verifying key
    pub fn address(&self) -> Address {
        address_of(&self.public_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::from_bytes(signature.to_bytes())
    }

    /// Build a signed operation envelope for the given sequence number
    pub fn sign_operation(&self, sequence: u64, operation: ChainOperation) -> SignedOperation {
        let caller = self.address();
        let message = SignedOperation::canonical_bytes(sequence, &caller, &operation);
        let signature = self.sign(&message);

        SignedOperation {
            sequence,
            caller,
            operation,
            signature,
        }
    }
}

/// Derive a chain address from a public key: last 20 bytes of SHA-256
pub fn address_of(public_key: &[u8; 32]) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    let digest: [u8; 32] = hasher.finalize().into();
    Address::new(format!("0x{}", hex::encode(&digest[12..])))
}
