use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::sync::{Notify, broadcast};
use tracing::debug;

use galekv_common::{DEFAULT_EVENT_CAPACITY, StoreError, StoreResult};

use crate::events::{Event, EventHub};
use crate::node::Node;
use crate::response::{Action, Response};

/// Item no BTreeSet de expiração: (instante, chave).
/// Ordenado por instante para purga eficiente.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct TtlEntry(pub(crate) SystemTime, pub(crate) String);

/// Estado guardado como um agregado único: mapa de entries + set de TTLs +
/// último índice aplicado. Invariante: node estável nunca tem TtlEntry; node
/// expirante presente no mapa tem exatamente um. Mutações mantêm os dois
/// lados sob o mesmo write lock.
pub(crate) struct Inner {
    pub(crate) entries: HashMap<String, Node>,
    pub(crate) ttls: BTreeSet<TtlEntry>,
    pub(crate) index: u64,
}

impl Inner {
    /// Instala (cria ou substitui) o node de uma chave, cobrindo as quatro
    /// transições estável/expirante no set de TTLs. Retorna o node anterior.
    fn install(&mut self, key: &str, value: String, expires_at: Option<SystemTime>) -> Option<Node> {
        let old = self.entries.get(key).cloned();
        if let Some(node) = &old
            && let Some(when) = node.expires_at
        {
            self.ttls.remove(&TtlEntry(when, key.to_string()));
        }
        if let Some(when) = expires_at {
            self.ttls.insert(TtlEntry(when, key.to_string()));
        }
        self.entries
            .insert(key.to_string(), Node::new(value, expires_at));
        old
    }

    fn next_deadline(&self) -> Option<SystemTime> {
        self.ttls.first().map(|e| e.0)
    }
}

pub(crate) struct Shared {
    pub(crate) inner: RwLock<Inner>,
    pub(crate) notify_expiry: Arc<Notify>,
    pub(crate) events: EventHub,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Acorda a task de purga para ela perceber que o último handle caiu
        self.notify_expiry.notify_one();
    }
}

/// Handle para o engine in-memory. Clone barato (Arc); todas as operações
/// são seguras sob paralelismo real.
#[derive(Clone)]
pub struct Store {
    pub(crate) shared: Arc<Shared>,
}

impl Store {
    /// Cria o store e spawna a task de purga de expirados.
    ///
    /// `capacity` dimensiona apenas o canal de eventos de mutação (o
    /// colaborador de histórico externo); o número de chaves do mapa não é
    /// limitado por ele. Precisa de um runtime tokio ativo.
    pub fn new(capacity: usize) -> Self {
        let store = Store {
            shared: Arc::new(Shared {
                inner: RwLock::new(Inner {
                    entries: HashMap::new(),
                    ttls: BTreeSet::new(),
                    index: 0,
                }),
                notify_expiry: Arc::new(Notify::new()),
                events: EventHub::new(capacity),
            }),
        };

        // Task de background que retira chaves expiradas. Segura só um Weak
        // para não prender o estado vivo depois do último handle cair.
        let weak = Arc::downgrade(&store.shared);
        let notify = store.shared.notify_expiry.clone();
        tokio::spawn(async move {
            purge_expired_keys(weak, notify).await;
        });

        store
    }

    /// Leitura pura sob read lock. O check lazy de expiração é autoritativo:
    /// um node vencido conta como ausente mesmo que a purga ainda não tenha
    /// disparado.
    pub fn get(&self, key: &str) -> StoreResult<Response> {
        let now = SystemTime::now();
        let inner = self.shared.inner.read();
        let node = inner.entries.get(key).ok_or(StoreError::KeyNotFound)?;
        if node.is_expired_at(now) {
            return Err(StoreError::KeyNotFound);
        }
        Ok(Response::for_get(key, node, inner.index, now))
    }

    /// Nunca falha. Uma expiração já no passado é aceita e armazenada — a
    /// chave fica imediatamente ilegível e a purga a retira no próximo
    /// disparo.
    ///
    /// Operações são aplicadas na ordem de aquisição do write lock (ordem
    /// real de chegada), não na ordem do `index`: o stamp é opaco para o
    /// engine e cabe à camada de consenso ordená-lo.
    pub fn set(
        &self,
        key: &str,
        value: &str,
        expires_at: Option<SystemTime>,
        index: u64,
    ) -> Response {
        let now = SystemTime::now();
        let mut inner = self.shared.inner.write();
        let deadline_before = inner.next_deadline();
        let old = inner.install(key, value.to_string(), expires_at);
        inner.index = index;
        let rearm = inner.next_deadline() != deadline_before;
        drop(inner);

        if rearm {
            self.shared.notify_expiry.notify_one();
        }

        let node = Node::new(value.to_string(), expires_at);
        self.shared.events.publish(Event {
            action: Action::Set,
            key: key.to_string(),
            old: old.clone(),
            new: Some(node.clone()),
            index,
        });
        Response::for_mutation(Action::Set, key, old.as_ref(), &node, index, now)
    }

    pub fn delete(&self, key: &str, index: u64) -> StoreResult<Response> {
        let now = SystemTime::now();
        let mut inner = self.shared.inner.write();
        let node = match inner.entries.get(key) {
            Some(n) if !n.is_expired_at(now) => n.clone(),
            // Expirada-mas-presente conta como ausente; a purga limpa depois
            _ => return Err(StoreError::KeyNotFound),
        };

        let deadline_before = inner.next_deadline();
        inner.entries.remove(key);
        if let Some(when) = node.expires_at {
            inner.ttls.remove(&TtlEntry(when, key.to_string()));
        }
        inner.index = index;
        let rearm = inner.next_deadline() != deadline_before;
        drop(inner);

        if rearm {
            self.shared.notify_expiry.notify_one();
        }

        self.shared.events.publish(Event {
            action: Action::Delete,
            key: key.to_string(),
            old: Some(node.clone()),
            new: None,
            index,
        });
        Ok(Response::for_delete(key, &node, index))
    }

    /// Update condicional ao valor atual da chave (igualdade exata de
    /// string). `prev_value` vazio é o sentinela "não pode existir ainda":
    /// cria a chave se ausente, falha se presente. Node expirado conta como
    /// ausente antes da comparação.
    pub fn compare_and_swap(
        &self,
        key: &str,
        prev_value: &str,
        value: &str,
        expires_at: Option<SystemTime>,
        index: u64,
    ) -> StoreResult<Response> {
        let now = SystemTime::now();
        let mut inner = self.shared.inner.write();
        let current = inner
            .entries
            .get(key)
            .filter(|n| !n.is_expired_at(now))
            .cloned();

        match &current {
            None if !prev_value.is_empty() => return Err(StoreError::KeyNotFound),
            Some(cur) if prev_value.is_empty() => {
                return Err(StoreError::TestFailed {
                    expected: String::new(),
                    actual: cur.value.clone(),
                });
            }
            Some(cur) if cur.value != prev_value => {
                return Err(StoreError::TestFailed {
                    expected: prev_value.to_string(),
                    actual: cur.value.clone(),
                });
            }
            _ => {}
        }

        let deadline_before = inner.next_deadline();
        inner.install(key, value.to_string(), expires_at);
        inner.index = index;
        let rearm = inner.next_deadline() != deadline_before;
        drop(inner);

        if rearm {
            self.shared.notify_expiry.notify_one();
        }

        let node = Node::new(value.to_string(), expires_at);
        self.shared.events.publish(Event {
            action: Action::CompareAndSwap,
            key: key.to_string(),
            old: current.clone(),
            new: Some(node.clone()),
            index,
        });
        Ok(Response::for_mutation(
            Action::CompareAndSwap,
            key,
            current.as_ref(),
            &node,
            index,
            now,
        ))
    }

    /// Inscreve-se no feed de eventos de mutação (set/delete/cas/expire).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Task de background que retira chaves expiradas no (ou logo após o)
/// instante de expiração, independente do tráfego de leitura/escrita.
/// Um único timer, sempre armado para o menor deadline pendente; qualquer
/// mutação que mude o mínimo dá notify e o timer é recomputado.
/// Encerra quando o último handle do store cai (upgrade do Weak falha).
async fn purge_expired_keys(weak: Weak<Shared>, notify: Arc<Notify>) {
    loop {
        let next = match weak.upgrade() {
            Some(shared) => shared.inner.read().next_deadline(),
            None => return,
        };

        match next {
            Some(when) => {
                let dur = when
                    .duration_since(SystemTime::now())
                    .unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(dur) => {}
                    // Mínimo mudou — recomputar o timer
                    _ = notify.notified() => continue,
                }
            }
            None => {
                notify.notified().await;
                continue;
            }
        }

        let Some(shared) = weak.upgrade() else { return };

        // Write lock só pela duração das remoções
        let now = SystemTime::now();
        let mut purged = Vec::new();
        {
            let mut inner = shared.inner.write();
            while let Some(entry) = inner.ttls.first().cloned() {
                if entry.0 > now {
                    break; // BTreeSet ordenado: o resto é futuro
                }
                inner.ttls.remove(&entry);
                // Entrada stale (Set trocou o TTL antes do timer disparar)
                // é no-op silencioso, não erro
                if let Some(node) = inner.entries.get(&entry.1)
                    && node.expires_at == Some(entry.0)
                {
                    let node = node.clone();
                    inner.entries.remove(&entry.1);
                    debug!("chave expirada removida: {}", entry.1);
                    purged.push((entry.1, node, inner.index));
                }
            }
        }

        for (key, node, index) in purged {
            shared.events.publish(Event {
                action: Action::Expire,
                key,
                old: Some(node),
                new: None,
                index,
            });
        }
    }
}
