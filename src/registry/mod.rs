use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::BallotError;

/// Fixed-length candidate key as stored by the contract (`bytes32`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidateId([u8; 32]);

impl CandidateId {
    pub const LEN: usize = 32;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Encode text the way the web frontend encoded `bytes32` arguments:
    /// `0x`-prefixed input is hex, a plain decimal integer is its minimal
    /// big-endian hex, anything else is UTF-8. All of them are left-aligned
    /// and zero padded on the right.
    pub fn parse(input: &str) -> Result<Self, BallotError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty"));
        }
        let bytes = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(digits) => decode_hex(input, digits)?,
            None if trimmed.bytes().all(|b| b.is_ascii_digit()) => {
                let number = U256::from_dec_str(trimmed)
                    .map_err(|e| invalid(input, &format!("{e:?}")))?;
                decode_hex(input, &format!("{number:x}"))?
            }
            None => trimmed.as_bytes().to_vec(),
        };
        if bytes.is_empty() {
            return Err(invalid(input, "no bytes after 0x"));
        }
        if bytes.len() > Self::LEN {
            return Err(invalid(
                input,
                &format!("{} bytes exceeds {}", bytes.len(), Self::LEN),
            ));
        }
        let mut out = [0u8; 32];
        out[..bytes.len()].copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Human-readable name when the id holds zero-padded UTF-8 text.
    pub fn label(&self) -> Option<String> {
        let end = self.0.iter().rposition(|b| *b != 0).map(|i| i + 1)?;
        let text = std::str::from_utf8(&self.0[..end]).ok()?;
        if text.chars().all(|c| !c.is_control()) {
            Some(text.to_string())
        } else {
            None
        }
    }
}

fn decode_hex(input: &str, digits: &str) -> Result<Vec<u8>, BallotError> {
    let digits = if digits.len() % 2 == 1 {
        // nibbles stay left-aligned, same as the padding
        format!("{digits}0")
    } else {
        digits.to_string()
    };
    hex::decode(&digits).map_err(|e| invalid(input, &e.to_string()))
}

fn invalid(input: &str, reason: &str) -> BallotError {
    BallotError::InvalidCandidateId {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for CandidateId {
    type Err = BallotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CandidateId({self})")
    }
}

/// Name of the place a candidate's tally is rendered.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplaySlot(String);

impl DisplaySlot {
    pub fn new(name: impl Into<String>) -> Result<Self, BallotError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(BallotError::InvalidSlot(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplaySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `[[candidates]]` entry as written in the config file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateEntry {
    pub id: String,
    pub slot: String,
}

/// Candidate id to display slot mapping. Built once, read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateRegistry {
    entries: BTreeMap<CandidateId, DisplaySlot>,
}

impl CandidateRegistry {
    pub fn from_entries(entries: &[CandidateEntry]) -> Result<Self, BallotError> {
        let mut map = BTreeMap::new();
        let mut slots = BTreeSet::new();
        for entry in entries {
            let id = CandidateId::parse(&entry.id)?;
            let slot = DisplaySlot::new(entry.slot.clone())?;
            if !slots.insert(slot.clone()) {
                return Err(BallotError::DuplicateEntry(format!("slot {slot}")));
            }
            if map.insert(id, slot).is_some() {
                return Err(BallotError::DuplicateEntry(format!("candidate {}", entry.id)));
            }
        }
        Ok(Self { entries: map })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &CandidateId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn slot_for(&self, id: &CandidateId) -> Option<&DisplaySlot> {
        self.entries.get(id)
    }

    pub fn resolve(&self, id: &CandidateId) -> Result<&DisplaySlot, BallotError> {
        self.slot_for(id).ok_or(BallotError::UnknownCandidate {
            candidate: *id,
            tx_hash: None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CandidateId, &DisplaySlot)> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &CandidateId> {
        self.entries.keys()
    }
}
