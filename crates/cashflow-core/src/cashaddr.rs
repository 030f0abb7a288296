//! CashAddr encoding/decoding (`spec.md` §4.2).
//!
//! Bitcoin Cash's address format is not standard bech32 (different
//! checksum polynomial, no published maintained crate implements it), so
//! this is a direct, from-scratch implementation of the algorithm
//! described in the CashAddr specification and used by every BCH wallet.

use crate::error::KeyError;

const CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Address type encoded in the CashAddr version byte's high bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    P2pkh,
    P2sh,
    /// P2SH with the CashToken-aware type bit set — the `tokenAddress` form
    /// subscribers fund into (`spec.md` §3, §4.4).
    P2shWithTokens,
}

fn polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07ff_ffff_ff) << 5) ^ (*d as u64);
        if c0 & 0x01 != 0 {
            c ^= 0x98f2bc8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79b76d99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf33e5fb3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae2eabe2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e4f43e470;
        }
    }
    c ^ 1
}

fn prefix_expand(prefix: &str) -> Vec<u8> {
    let mut ret: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    ret.push(0);
    ret
}

fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv = (1u32 << to_bits) - 1;
    let mut ret = Vec::new();
    for &value in data {
        let v = value as u32;
        if (v >> from_bits) != 0 {
            return None;
        }
        acc = (acc << from_bits) | v;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return None;
    }
    Some(ret)
}

/// Encodes a 20-byte hash into a CashAddr string with the given `prefix`
/// (`"bitcoincash"` or `"bchtest"`) and `AddressType`.
pub fn encode(prefix: &str, kind: AddressType, hash: &[u8; 20]) -> String {
    let type_bits: u8 = match kind {
        AddressType::P2pkh => 0,
        AddressType::P2sh => 1,
        AddressType::P2shWithTokens => 3,
    };
    // size bits for a 160-bit hash are 0
    let version_byte = type_bits << 3;
    let mut payload = Vec::with_capacity(21);
    payload.push(version_byte);
    payload.extend_from_slice(hash);

    let payload_5bit = convert_bits(&payload, 8, 5, true).expect("20-byte payload always fits");

    let mut checksum_input = prefix_expand(prefix);
    checksum_input.extend_from_slice(&payload_5bit);
    checksum_input.extend_from_slice(&[0u8; 8]);
    let checksum = polymod(&checksum_input);

    let mut combined = payload_5bit;
    for i in 0..8 {
        combined.push(((checksum >> (5 * (7 - i))) & 0x1f) as u8);
    }

    let mut out = String::with_capacity(prefix.len() + 1 + combined.len());
    out.push_str(prefix);
    out.push(':');
    for b in combined {
        out.push(CHARSET[b as usize] as char);
    }
    out
}

/// Decodes a CashAddr string, returning `(prefix, AddressType, hash160)`.
pub fn decode(address: &str) -> Result<(String, AddressType, [u8; 20]), KeyError> {
    let (prefix, data_part) = match address.split_once(':') {
        Some((p, d)) => (p.to_lowercase(), d),
        None => return Err(KeyError::InvalidAddress("missing network prefix".into())),
    };
    if data_part != data_part.to_lowercase() && data_part != data_part.to_uppercase() {
        return Err(KeyError::InvalidAddress("mixed case".into()));
    }
    let data_part = data_part.to_lowercase();

    let mut values = Vec::with_capacity(data_part.len());
    for c in data_part.chars() {
        let v = CHARSET
            .iter()
            .position(|&x| x as char == c)
            .ok_or_else(|| KeyError::InvalidAddress(format!("invalid character '{c}'")))?;
        values.push(v as u8);
    }
    if values.len() < 8 {
        return Err(KeyError::InvalidAddress("address too short".into()));
    }

    let mut checksum_input = prefix_expand(&prefix);
    checksum_input.extend_from_slice(&values);
    if polymod(&checksum_input) != 0 {
        return Err(KeyError::InvalidAddress("checksum mismatch".into()));
    }

    let payload_5bit = &values[..values.len() - 8];
    let payload =
        convert_bits(payload_5bit, 5, 8, false).ok_or(KeyError::InvalidAddress(
            "invalid bit grouping".to_string(),
        ))?;
    if payload.len() != 21 {
        return Err(KeyError::InvalidAddress(
            "unsupported hash length".to_string(),
        ));
    }
    let version_byte = payload[0];
    let type_bits = (version_byte >> 3) & 0x0f;
    let kind = match type_bits {
        0 => AddressType::P2pkh,
        1 => AddressType::P2sh,
        3 => AddressType::P2shWithTokens,
        other => {
            return Err(KeyError::InvalidAddress(format!(
                "unsupported address type bits {other}"
            )));
        }
    };
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((prefix, kind, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_p2pkh() {
        let hash = [0x11u8; 20];
        let addr = encode("bchtest", AddressType::P2pkh, &hash);
        assert!(addr.starts_with("bchtest:"));
        let (prefix, kind, decoded_hash) = decode(&addr).unwrap();
        assert_eq!(prefix, "bchtest");
        assert_eq!(kind, AddressType::P2pkh);
        assert_eq!(decoded_hash, hash);
    }

    #[test]
    fn roundtrips_p2sh() {
        let hash = [0xab; 20];
        let addr = encode("bitcoincash", AddressType::P2sh, &hash);
        let (_, kind, decoded_hash) = decode(&addr).unwrap();
        assert_eq!(kind, AddressType::P2sh);
        assert_eq!(decoded_hash, hash);
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let hash = [0x22u8; 20];
        let mut addr = encode("bchtest", AddressType::P2pkh, &hash);
        let last = addr.pop().unwrap();
        let replacement = if last == 'q' { 'p' } else { 'q' };
        addr.push(replacement);
        assert!(decode(&addr).is_err());
    }
}
