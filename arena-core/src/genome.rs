//! Population entries and the records that flow through a tournament

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::{self, GenomeId};

/// Opaque data a worker needs to rebuild a genome's executor
pub type GenomeFactoryOptions = serde_json::Value;

/// A genome handed to the engine by the population owner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenomeEntry {
    pub species_index: u32,
    pub organism_index: u32,
    /// Serialized genome, never mutated by the engine
    pub options: GenomeFactoryOptions,
}

impl GenomeEntry {
    pub fn new(species_index: u32, organism_index: u32, options: GenomeFactoryOptions) -> Self {
        Self {
            species_index,
            organism_index,
            options,
        }
    }

    /// Packed id for this entry
    pub fn id(&self) -> Result<GenomeId> {
        GenomeId::pack(self.species_index, self.organism_index)
    }

    /// Wire form sent to a worker
    pub fn to_player(&self) -> Result<Player> {
        Ok(Player {
            id: self.id()?,
            options: self.options.clone(),
        })
    }
}

/// Unit of work sent to a worker for one seat in a match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(with = "identity::as_string")]
    pub id: GenomeId,
    pub options: GenomeFactoryOptions,
}

/// Raw score a genome earned in one match
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub id: GenomeId,
    pub score: f64,
}

impl PlayerScore {
    pub fn new(id: GenomeId, score: f64) -> Self {
        Self { id, score }
    }
}

/// Final per-genome output of one generation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitnessEntry {
    pub species_index: u32,
    pub organism_index: u32,
    pub fitness: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_to_player() {
        let entry = GenomeEntry::new(2, 7, json!({"weights": [0.5]}));
        let player = entry.to_player().unwrap();
        assert_eq!(player.id, GenomeId::pack(2, 7).unwrap());
        assert_eq!(player.options, json!({"weights": [0.5]}));
    }

    #[test]
    fn test_player_id_serializes_as_string() {
        let player = GenomeEntry::new(0, 3, json!(null)).to_player().unwrap();
        let value = serde_json::to_value(&player).unwrap();
        assert_eq!(value["id"], json!("3"));

        let back: Player = serde_json::from_value(value).unwrap();
        assert_eq!(back, player);
    }

    #[test]
    fn test_entry_out_of_range() {
        let entry = GenomeEntry::new(1 << 26, 0, json!(null));
        assert!(entry.id().is_err());
        assert!(entry.to_player().is_err());
    }
}
