//! Genome identity - packs (species, organism) into one comparable key
//!
//! Every map in the engine that needs to agree on "which genome" is keyed by
//! [`GenomeId`]. The packing is `(species << 26) | organism`, injective over
//! the legal index range.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArenaError, Result};

/// Bits reserved for each index
pub const INDEX_BITS: u32 = 26;

/// Largest legal species or organism index (2^26 - 1)
pub const MAX_INDEX: u32 = (1 << INDEX_BITS) - 1;

/// Packed genome identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenomeId(u64);

impl GenomeId {
    /// Pack a species and organism index into one id
    ///
    /// Fails with [`ArenaError::IdOutOfRange`] if either index exceeds [`MAX_INDEX`].
    pub fn pack(species_index: u32, organism_index: u32) -> Result<Self> {
        check_index("species", species_index)?;
        check_index("organism", organism_index)?;
        Ok(GenomeId(
            ((species_index as u64) << INDEX_BITS) | organism_index as u64,
        ))
    }

    /// Species half of the key
    pub fn species_index(self) -> u32 {
        (self.0 >> INDEX_BITS) as u32
    }

    /// Organism half of the key
    pub fn organism_index(self) -> u32 {
        (self.0 & MAX_INDEX as u64) as u32
    }

    /// Raw packed value
    pub fn raw(self) -> u64 {
        self.0
    }
}

fn check_index(field: &'static str, value: u32) -> Result<()> {
    if value > MAX_INDEX {
        return Err(ArenaError::IdOutOfRange {
            field,
            value: value as u64,
        });
    }
    Ok(())
}

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenomeId {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self> {
        let raw: u64 = s
            .parse()
            .map_err(|_| ArenaError::protocol(format!("malformed genome id: {s:?}")))?;
        let species = raw >> INDEX_BITS;
        if species > MAX_INDEX as u64 {
            return Err(ArenaError::IdOutOfRange {
                field: "species",
                value: species,
            });
        }
        Ok(GenomeId(raw))
    }
}

/// Serde adapter that writes a [`GenomeId`] as a decimal string
pub mod as_string {
    use super::GenomeId;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &GenomeId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GenomeId, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
