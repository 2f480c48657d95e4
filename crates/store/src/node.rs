use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Unidade de armazenamento de uma chave: valor + expiração absoluta opcional.
/// `None` = nunca expira. Wall-clock (não monotônico) para o snapshot
/// preservar o instante absoluto entre processos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SystemTime>,
}

impl Node {
    pub fn new(value: String, expires_at: Option<SystemTime>) -> Self {
        Self { value, expires_at }
    }

    /// Regra única de expiração: `now >= expires_at`. O check lazy do Get e
    /// a purga de background usam exatamente esta comparação.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// Segundos restantes reportados ao caller: teto em segundos inteiros,
    /// nunca zero para um node ainda vivo. `None` se o node é estável.
    pub fn ttl_secs(&self, now: SystemTime) -> Option<u64> {
        self.expires_at.map(|t| match t.duration_since(now) {
            Ok(remaining) => {
                let secs = remaining.as_secs();
                if remaining.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                }
            }
            Err(_) => 0,
        })
    }
}
