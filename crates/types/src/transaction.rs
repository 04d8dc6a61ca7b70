//! Value transfers and their signed form.

use crate::crypto::{self, PUBLIC_KEY_BYTES};
use crate::{Address, KeyPair, TxHash};
use serde::{Deserialize, Serialize};

/// Domain separator prepended to every transfer signing message.
const DOMAIN_TRANSFER: &[u8] = b"loadgen/transfer/v1";

/// An unsigned value transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    /// Amount in the network's base unit.
    pub amount: u64,
    /// Fee in the network's base unit.
    pub fee: u64,
    /// Sender's account nonce this transfer consumes.
    pub nonce: u64,
    #[serde(with = "hex::serde", default)]
    pub payload: Vec<u8>,
}

impl Transfer {
    /// Canonical byte encoding that gets signed.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            DOMAIN_TRANSFER.len() + 2 * Address::BYTES + 32 + self.payload.len(),
        );
        bytes.extend_from_slice(DOMAIN_TRANSFER);
        bytes.extend_from_slice(self.from.as_bytes());
        bytes.extend_from_slice(self.to.as_bytes());
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes.extend_from_slice(&self.fee.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Sign with the sender's key.
    pub fn sign(self, key: &KeyPair) -> SignedTransfer {
        let message = self.signing_bytes();
        let signature = key.sign(&message).to_vec();
        let hash = TxHash::from_parts(&[&message, &signature]);
        SignedTransfer {
            transfer: self,
            public_key: key.public_key(),
            signature,
            hash,
        }
    }
}

/// A transfer together with its signature and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransfer {
    #[serde(flatten)]
    pub transfer: Transfer,
    #[serde(with = "hex::serde")]
    pub public_key: [u8; PUBLIC_KEY_BYTES],
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    pub hash: TxHash,
}

impl SignedTransfer {
    /// Check the signature and that the signer owns the `from` address.
    pub fn verify(&self) -> bool {
        Address::from_public_key(&self.public_key) == self.transfer.from
            && crypto::verify(
                &self.public_key,
                &self.transfer.signing_bytes(),
                &self.signature,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_from(key: &KeyPair) -> Transfer {
        Transfer {
            from: key.address(),
            to: KeyPair::from_seed(&[2u8; 32]).address(),
            amount: 5,
            fee: 0,
            nonce: 3,
            payload: Vec::new(),
        }
    }

    #[test]
    fn test_signed_transfer_verifies() {
        let key = KeyPair::from_seed(&[1u8; 32]);
        let signed = transfer_from(&key).sign(&key);
        assert!(signed.verify());
    }

    #[test]
    fn test_wrong_signer_fails_verification() {
        let owner = KeyPair::from_seed(&[1u8; 32]);
        let other = KeyPair::from_seed(&[3u8; 32]);
        let signed = transfer_from(&owner).sign(&other);
        assert!(!signed.verify());
    }

    #[test]
    fn test_hash_depends_on_nonce() {
        let key = KeyPair::from_seed(&[1u8; 32]);
        let a = transfer_from(&key).sign(&key);
        let mut t = transfer_from(&key);
        t.nonce += 1;
        let b = t.sign(&key);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_json_shape() {
        let key = KeyPair::from_seed(&[1u8; 32]);
        let signed = transfer_from(&key).sign(&key);
        let value = serde_json::to_value(&signed).unwrap();
        assert_eq!(value["amount"], 5);
        assert_eq!(value["nonce"], 3);
        assert_eq!(value["from"], key.address().to_hex());
        assert_eq!(value["hash"], signed.hash.to_hex());
        let back: SignedTransfer = serde_json::from_value(value).unwrap();
        assert_eq!(back, signed);
    }
}
