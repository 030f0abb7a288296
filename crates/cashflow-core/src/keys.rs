//! Key & Address Utilities (`spec.md` §4.2).
//!
//! Deterministic functions over secp256k1 and the CashAddr format. Grounded
//! on the teacher's `x402-chain-eip155`/`x402-chain-solana` per-chain
//! signer modules, which play the same "keypair + address derivation" role
//! for their respective chains.

use crate::cashaddr::{self, AddressType};
use crate::error::KeyError;
use cashflow_types::Pkh;
use ripemd::Ripemd160;
use secp256k1::rand::rngs::OsRng;
use secp256k1::{Keypair, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

/// Which BCH network an address/WIF belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Chipnet,
}

impl Network {
    pub fn cashaddr_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "bitcoincash",
            Network::Chipnet => "bchtest",
        }
    }

    fn wif_version_byte(&self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Chipnet => 0xef,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedKeypair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
    pub pkh: Pkh,
    pub address: String,
    pub wif: String,
}

/// hash160 = RIPEMD160(SHA256(data)).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd);
    out
}

/// hash256 = SHA256(SHA256(data)), used throughout the BCH sighash preimage.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

fn pkh_from_pubkey(pubkey: &PublicKey) -> Pkh {
    Pkh::from_bytes(hash160(&pubkey.serialize()))
}

/// Generates a fresh secp256k1 keypair using a CSPRNG (`spec.md` §4.2).
pub fn generate_keypair(network: Network) -> GeneratedKeypair {
    let secp = Secp256k1::new();
    let keypair = Keypair::new(&secp, &mut OsRng);
    let secret_key = keypair.secret_key();
    let public_key = keypair.public_key();
    let pkh = pkh_from_pubkey(&public_key);
    let address = cashaddr::encode(network.cashaddr_prefix(), AddressType::P2pkh, pkh.as_bytes());
    let wif = encode_wif(&secret_key, network);
    GeneratedKeypair {
        secret_key,
        public_key,
        pkh,
        address,
        wif,
    }
}

/// Encodes a secret key as a compressed-pubkey WIF string.
pub fn encode_wif(secret_key: &SecretKey, network: Network) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(network.wif_version_byte());
    payload.extend_from_slice(&secret_key.secret_bytes());
    payload.push(0x01); // compressed marker
    let checksum = hash256(&payload);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

/// Decodes a WIF string into a keypair, deriving address and PKH along the way.
pub fn wif_to_keypair(wif: &str) -> Result<GeneratedKeypair, KeyError> {
    let payload = bs58::decode(wif)
        .into_vec()
        .map_err(|e| KeyError::InvalidWif(e.to_string()))?;
    if payload.len() != 38 {
        return Err(KeyError::InvalidWif(format!(
            "expected 38-byte payload, got {}",
            payload.len()
        )));
    }
    let (body, checksum) = payload.split_at(34);
    let expected = hash256(body);
    if &expected[..4] != checksum {
        return Err(KeyError::InvalidWif("checksum mismatch".into()));
    }
    let version_byte = body[0];
    let network = match version_byte {
        0x80 => Network::Mainnet,
        0xef => Network::Chipnet,
        other => {
            return Err(KeyError::InvalidWif(format!(
                "unrecognized version byte 0x{other:02x}"
            )));
        }
    };
    if body[33] != 0x01 {
        return Err(KeyError::InvalidWif(
            "only compressed-pubkey WIFs are supported".into(),
        ));
    }
    let secret_key = SecretKey::from_slice(&body[1..33])
        .map_err(|e| KeyError::InvalidWif(e.to_string()))?;
    let secp = Secp256k1::new();
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    let pkh = pkh_from_pubkey(&public_key);
    let address = cashaddr::encode(network.cashaddr_prefix(), AddressType::P2pkh, pkh.as_bytes());
    let wif = encode_wif(&secret_key, network);
    Ok(GeneratedKeypair {
        secret_key,
        public_key,
        pkh,
        address,
        wif,
    })
}

/// Extracts the 20-byte PKH backing a CashAddr address.
pub fn address_to_pkh(address: &str) -> Result<Pkh, KeyError> {
    let (_, _, hash) = cashaddr::decode(address)?;
    Ok(Pkh::from_bytes(hash))
}

/// Returns the network prefix implied by an address's cashaddr text.
pub fn address_network(address: &str) -> Result<Network, KeyError> {
    let (prefix, _, _) = cashaddr::decode(address)?;
    match prefix.as_str() {
        "bitcoincash" => Ok(Network::Mainnet),
        "bchtest" => Ok(Network::Chipnet),
        other => Err(KeyError::InvalidAddress(format!(
            "unrecognized address prefix {other}"
        ))),
    }
}

/// Builds the P2PKH locking bytecode for a CashAddr address.
pub fn address_to_locking_bytecode(address: &str) -> Result<Vec<u8>, KeyError> {
    let (_, kind, hash) = cashaddr::decode(address)?;
    Ok(locking_bytecode_for(kind, &hash))
}

pub fn locking_bytecode_for(kind: AddressType, hash: &[u8; 20]) -> Vec<u8> {
    match kind {
        AddressType::P2pkh => {
            let mut script = Vec::with_capacity(25);
            script.push(0x76); // OP_DUP
            script.push(0xa9); // OP_HASH160
            script.push(0x14); // push 20 bytes
            script.extend_from_slice(hash);
            script.push(0x88); // OP_EQUALVERIFY
            script.push(0xac); // OP_CHECKSIG
            script
        }
        AddressType::P2sh | AddressType::P2shWithTokens => {
            // Token-awareness is an address-display concept, not a script
            // difference: both forms unlock the same P2SH redeem script.
            let mut script = Vec::with_capacity(23);
            script.push(0xa9); // OP_HASH160
            script.push(0x14);
            script.extend_from_slice(hash);
            script.push(0x87); // OP_EQUAL
            script
        }
    }
}

/// Electrum scripthash: SHA256(locking bytecode), byte-reversed, hex.
pub fn address_to_scripthash(address: &str) -> Result<String, KeyError> {
    let bytecode = address_to_locking_bytecode(address)?;
    Ok(scripthash_for_bytecode(&bytecode))
}

pub fn scripthash_for_bytecode(bytecode: &[u8]) -> String {
    let mut digest = Sha256::digest(bytecode).to_vec();
    digest.reverse();
    hex::encode(digest)
}

/// Builds the 8-byte little-endian NFT commitment: `lastClaimBlock(i32) || authorizedSats(i32)`.
pub fn build_nft_commitment(last_claim_block: i32, authorized_sats: i32) -> String {
    let mut bytes = Vec::with_capacity(8);
    bytes.extend_from_slice(&last_claim_block.to_le_bytes());
    bytes.extend_from_slice(&authorized_sats.to_le_bytes());
    hex::encode(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NftCommitment {
    pub last_claim_block: i32,
    pub authorized_sats: i32,
}

pub fn parse_nft_commitment(hex_str: &str) -> Result<NftCommitment, KeyError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| KeyError::InvalidCommitment(format!("invalid hex: {e}")))?;
    if bytes.len() != 8 {
        return Err(KeyError::InvalidCommitment(format!(
            "expected 8 bytes, got {}",
            bytes.len()
        )));
    }
    let last_claim_block = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let authorized_sats = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
    Ok(NftCommitment {
        last_claim_block,
        authorized_sats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wif_roundtrips_to_the_same_string() {
        let generated = generate_keypair(Network::Chipnet);
        let decoded = wif_to_keypair(&generated.wif).unwrap();
        assert_eq!(decoded.wif, generated.wif);
        assert_eq!(decoded.address, generated.address);
    }

    #[test]
    fn commitment_roundtrips() {
        let hex = build_nft_commitment(12345, 20000);
        let parsed = parse_nft_commitment(&hex).unwrap();
        assert_eq!(parsed.last_claim_block, 12345);
        assert_eq!(parsed.authorized_sats, 20000);
    }

    #[test]
    fn rejects_wrong_length_commitment() {
        assert!(parse_nft_commitment("aabb").is_err());
    }
}
