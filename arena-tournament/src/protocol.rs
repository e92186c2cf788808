//! Coordinator <-> worker message protocol
//!
//! Every message is an envelope `{ "type": ACTION_TYPE, "payload": ... }`.
//! Coordinator-bound and worker-bound messages share one enum so that a
//! message arriving at the wrong end can be recognised and rejected.

use std::fmt;

use arena_core::{Player, PlayerScore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PluginKeys;

/// Message discriminant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    InitEvaluator,
    InitEvaluatorSuccess,
    InitGenomeFactory,
    InitGenomeFactorySuccess,
    RequestEvaluateMatch,
    RespondEvaluateMatch,
    RequestClearGenomeCache,
    RespondClearGenomeCache,
    Terminate,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::InitEvaluator => "INIT_EVALUATOR",
            ActionType::InitEvaluatorSuccess => "INIT_EVALUATOR_SUCCESS",
            ActionType::InitGenomeFactory => "INIT_GENOME_FACTORY",
            ActionType::InitGenomeFactorySuccess => "INIT_GENOME_FACTORY_SUCCESS",
            ActionType::RequestEvaluateMatch => "REQUEST_EVALUATE_MATCH",
            ActionType::RespondEvaluateMatch => "RESPOND_EVALUATE_MATCH",
            ActionType::RequestClearGenomeCache => "REQUEST_CLEAR_GENOME_CACHE",
            ActionType::RespondClearGenomeCache => "RESPOND_CLEAR_GENOME_CACHE",
            ActionType::Terminate => "TERMINATE",
        }
    }

    /// True for messages a worker is expected to handle
    pub fn is_worker_bound(self) -> bool {
        matches!(
            self,
            ActionType::InitEvaluator
                | ActionType::InitGenomeFactory
                | ActionType::RequestEvaluateMatch
                | ActionType::RequestClearGenomeCache
                | ActionType::Terminate
        )
    }

    /// Acknowledgement a worker sends back, if any
    pub fn reply(self) -> Option<ActionType> {
        match self {
            ActionType::InitEvaluator => Some(ActionType::InitEvaluatorSuccess),
            ActionType::InitGenomeFactory => Some(ActionType::InitGenomeFactorySuccess),
            ActionType::RequestEvaluateMatch => Some(ActionType::RespondEvaluateMatch),
            ActionType::RequestClearGenomeCache => Some(ActionType::RespondClearGenomeCache),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `INIT_EVALUATOR`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorInit {
    pub keys: PluginKeys,
    pub environment_options: Value,
    /// Genomes each worker keeps hydrated
    #[serde(default)]
    pub cache_capacity: usize,
}

impl EvaluatorInit {
    pub fn new(keys: PluginKeys, environment_options: Value) -> Self {
        Self {
            keys,
            environment_options,
            cache_capacity: 0,
        }
    }
}

/// Payload of `INIT_GENOME_FACTORY`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenomeFactoryInit {
    pub config_data: Value,
    pub genome_options: Value,
    pub init_config: Value,
}

/// Who the players in a match face
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The game executor plays all players against each other
    #[default]
    Tournament,
    /// The environment scores a single player against its baseline
    Baseline,
}

/// Payload of `REQUEST_EVALUATE_MATCH`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub players: Vec<Player>,
    #[serde(default)]
    pub mode: MatchMode,
}

impl MatchRequest {
    pub fn tournament(players: Vec<Player>) -> Self {
        Self {
            players,
            mode: MatchMode::Tournament,
        }
    }

    pub fn baseline(player: Player) -> Self {
        Self {
            players: vec![player],
            mode: MatchMode::Baseline,
        }
    }
}

/// Message envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    InitEvaluator(EvaluatorInit),
    InitEvaluatorSuccess,
    InitGenomeFactory(GenomeFactoryInit),
    InitGenomeFactorySuccess,
    RequestEvaluateMatch(MatchRequest),
    RespondEvaluateMatch(Vec<PlayerScore>),
    RequestClearGenomeCache,
    RespondClearGenomeCache,
    Terminate,
}

impl Message {
    pub fn action_type(&self) -> ActionType {
        match self {
            Message::InitEvaluator(_) => ActionType::InitEvaluator,
            Message::InitEvaluatorSuccess => ActionType::InitEvaluatorSuccess,
            Message::InitGenomeFactory(_) => ActionType::InitGenomeFactory,
            Message::InitGenomeFactorySuccess => ActionType::InitGenomeFactorySuccess,
            Message::RequestEvaluateMatch(_) => ActionType::RequestEvaluateMatch,
            Message::RespondEvaluateMatch(_) => ActionType::RespondEvaluateMatch,
            Message::RequestClearGenomeCache => ActionType::RequestClearGenomeCache,
            Message::RespondClearGenomeCache => ActionType::RespondClearGenomeCache,
            Message::Terminate => ActionType::Terminate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::GenomeEntry;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let player = GenomeEntry::new(0, 1, json!({"w": 1})).to_player().unwrap();
        let msg = Message::RequestEvaluateMatch(MatchRequest::tournament(vec![player]));
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], json!("REQUEST_EVALUATE_MATCH"));
        assert_eq!(value["payload"]["players"][0]["id"], json!("1"));
        assert_eq!(value["payload"]["mode"], json!("tournament"));
    }

    #[test]
    fn test_unit_message_parses() {
        let msg: Message = serde_json::from_value(json!({"type": "TERMINATE"})).unwrap();
        assert_eq!(msg, Message::Terminate);
        assert_eq!(msg.action_type().to_string(), "TERMINATE");
    }

    #[test]
    fn test_mode_defaults_to_tournament() {
        let msg: Message = serde_json::from_value(json!({
            "type": "REQUEST_EVALUATE_MATCH",
            "payload": {"players": []}
        }))
        .unwrap();
        match msg {
            Message::RequestEvaluateMatch(req) => assert_eq!(req.mode, MatchMode::Tournament),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_reply_mapping() {
        assert_eq!(
            ActionType::RequestEvaluateMatch.reply(),
            Some(ActionType::RespondEvaluateMatch)
        );
        assert_eq!(ActionType::Terminate.reply(), None);
        assert!(ActionType::InitGenomeFactory.is_worker_bound());
        assert!(!ActionType::RespondClearGenomeCache.is_worker_bound());
    }
}
