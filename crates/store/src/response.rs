use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::node::Node;

/// Tipo de operação, refletido na Response e nos eventos de mutação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "get")]
    Get,
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "compareAndSwap")]
    CompareAndSwap,
    #[serde(rename = "expire")]
    Expire,
}

/// Projeção read-only de uma operação completada. Construída fresh a cada
/// chamada — o caller nunca enxerga (nem muta) o Node interno do mapa.
/// Serializável como JSON com os nomes de campo do contrato externo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub action: Action,
    pub key: String,
    pub value: String,
    #[serde(rename = "prevValue", default, skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<String>,
    #[serde(rename = "newKey", default, skip_serializing_if = "std::ops::Not::not")]
    pub new_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    pub index: u64,
}

impl Response {
    pub(crate) fn for_get(key: &str, node: &Node, index: u64, now: SystemTime) -> Self {
        Self {
            action: Action::Get,
            key: key.to_string(),
            value: node.value.clone(),
            prev_value: None,
            new_key: false,
            expiration: node.expires_at,
            ttl: node.ttl_secs(now),
            index,
        }
    }

    pub(crate) fn for_mutation(
        action: Action,
        key: &str,
        prev: Option<&Node>,
        node: &Node,
        index: u64,
        now: SystemTime,
    ) -> Self {
        Self {
            action,
            key: key.to_string(),
            value: node.value.clone(),
            prev_value: prev.map(|n| n.value.clone()),
            new_key: prev.is_none(),
            expiration: node.expires_at,
            ttl: node.ttl_secs(now),
            index,
        }
    }

    pub(crate) fn for_delete(key: &str, prev: &Node, index: u64) -> Self {
        Self {
            action: Action::Delete,
            key: key.to_string(),
            value: String::new(),
            prev_value: Some(prev.value.clone()),
            new_key: false,
            expiration: None,
            ttl: None,
            index,
        }
    }
}
