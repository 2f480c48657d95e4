use tokio::sync::broadcast;

use crate::node::Node;
use crate::response::Action;

/// Evento pós-mutação entregue ao colaborador externo de histórico/watchers.
/// Carrega o estado antigo e novo do node para o observador não precisar
/// reler o store.
#[derive(Debug, Clone)]
pub struct Event {
    pub action: Action,
    pub key: String,
    /// Node anterior (`None` quando a chave foi criada).
    pub old: Option<Node>,
    /// Node resultante (`None` em delete/expire).
    pub new: Option<Node>,
    pub index: u64,
}

/// Fan-out de eventos de mutação. Entrega lossy: receiver atrasado perde
/// eventos, e sem nenhum receiver o send é descartado.
#[derive(Debug)]
pub(crate) struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl EventHub {
    /// `capacity` vem do construtor do store. Clamp em 1 porque o canal
    /// broadcast não aceita capacidade zero.
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
