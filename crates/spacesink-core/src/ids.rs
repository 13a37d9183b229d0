//! Deterministic entity identifiers.
//!
//! Every projected row is keyed by an id derived from stable on-chain inputs,
//! so replaying a block (after a restart or a rollback) rewrites the same keys.
//!
//! Algorithm: join the inputs with `:`, SHA-256 the result, use the first 16
//! digest bytes as the random bytes of a v4 UUID, and base58-encode the 16
//! UUID bytes.

use sha2::{Digest, Sha256};

use crate::address;

/// Derive an id from an ordered tuple of stable inputs.
pub fn derive_id(parts: &[&str]) -> String {
    let input = parts.join(":");
    let digest = Sha256::digest(input.as_bytes());
    let mut seed = [0u8; 16];
    seed.copy_from_slice(&digest[..16]);
    let uuid = uuid::Builder::from_random_bytes(seed).into_uuid();
    bs58::encode(uuid.as_bytes()).into_string()
}

/// Id of the space governed by the DAO at `address` on `network`.
pub fn space_id(network: &str, address: &str) -> String {
    let normalized = normalize(address);
    derive_id(&[network, &normalized])
}

/// Id of proposal `onchain_proposal_id` submitted to the voting plugin at
/// `plugin_address`.
pub fn proposal_id(plugin_address: &str, onchain_proposal_id: &str) -> String {
    let normalized = normalize(plugin_address);
    derive_id(&[&normalized, onchain_proposal_id])
}

fn normalize(addr: &str) -> String {
    address::checksum(addr).unwrap_or_else(|| addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAO: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn space_id_is_stable() {
        let a = space_id("GEO", DAO);
        let b = space_id("GEO", DAO);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn space_id_ignores_address_casing() {
        assert_eq!(space_id("GEO", DAO), space_id("GEO", &DAO.to_lowercase()));
    }

    #[test]
    fn space_id_depends_on_network() {
        assert_ne!(space_id("GEO", DAO), space_id("ETHEREUM", DAO));
    }

    #[test]
    fn proposal_id_is_stable_and_distinct() {
        let p1 = proposal_id(DAO, "1");
        assert_eq!(p1, proposal_id(DAO, "1"));
        assert_ne!(p1, proposal_id(DAO, "2"));
        assert_ne!(p1, space_id("GEO", DAO));
    }

    #[test]
    fn id_encodes_a_v4_uuid() {
        let id = derive_id(&["GEO", DAO]);
        let bytes = bs58::decode(&id).into_vec().unwrap();
        assert_eq!(bytes.len(), 16);
        let uuid = uuid::Uuid::from_slice(&bytes).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
    }
}
