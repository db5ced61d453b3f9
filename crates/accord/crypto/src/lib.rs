//! Accord signing primitives.
//!
//! Private key material never leaves a [`SigningService`]; everything else in
//! the protocol handles only [`PublicKey`]s and [`Signature`]s.

#![deny(unsafe_code)]

use accord_types::{Party, PartySignature, PublicKey, Signature, TransitionId};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

/// Signing capability bound to the local party's private key.
pub trait SigningService: Send + Sync {
    /// Identity whose key this service signs with.
    fn identity(&self) -> &Party;

    fn sign(&self, data: &[u8]) -> Signature;

    fn verify(&self, party: &Party, data: &[u8], signature: &Signature) -> bool {
        verify(party, data, signature)
    }

    /// Sign a proposal's transition id on behalf of [`Self::identity`].
    fn sign_transition(&self, id: &TransitionId) -> PartySignature {
        PartySignature {
            party: self.identity().clone(),
            signature: self.sign(id.as_bytes()),
        }
    }
}

/// Check `signature` over `data` against `party`'s public key.
pub fn verify(party: &Party, data: &[u8], signature: &Signature) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(party.key.as_bytes()) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    key.verify(data, &signature).is_ok()
}

/// Check a collected party signature over a transition id.
pub fn verify_transition(id: &TransitionId, signature: &PartySignature) -> bool {
    verify(&signature.party, id.as_bytes(), &signature.signature)
}

/// In-process Ed25519 signer.
pub struct Ed25519Signer {
    key: SigningKey,
    identity: Party,
}

impl Ed25519Signer {
    /// Fresh random key pair for `name`.
    pub fn generate(name: impl Into<String>) -> Self {
        let seed: [u8; 32] = rand::random();
        Self::from_seed(name, seed)
    }

    /// Deterministic key pair, used for fixtures and replayable demos.
    pub fn from_seed(name: impl Into<String>, seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let identity = Party::new(name, PublicKey(key.verifying_key().to_bytes()));
        Self { key, identity }
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.key
    }
}

impl SigningService for Ed25519Signer {
    fn identity(&self) -> &Party {
        &self.identity
    }

    fn sign(&self, data: &[u8]) -> Signature {
        Signature(self.key.sign(data).to_bytes())
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
