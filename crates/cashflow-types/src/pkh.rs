//! 20-byte hash160 newtype shared by merchant and subscriber identities.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pkh([u8; 20]);

#[derive(Debug, thiserror::Error)]
pub enum PkhParseError {
    #[error("PKH must be 40 hex characters (20 bytes), got {0}")]
    WrongLength(usize),
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl Pkh {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Pkh(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, PkhParseError> {
        let s = s.trim_start_matches("0x");
        if s.len() != 40 {
            return Err(PkhParseError::WrongLength(s.len()));
        }
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Pkh(arr))
    }
}

impl Display for Pkh {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for Pkh {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Pkh {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pkh::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
