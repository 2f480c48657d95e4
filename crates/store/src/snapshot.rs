use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;
use tracing::info;

use galekv_common::{StoreError, StoreResult};

use crate::node::Node;
use crate::store::{Store, TtlEntry};

impl Store {
    /// Deep copy das entries sob um read lock breve. Usado pelo Save para
    /// serializar sem segurar o lock pela serialização inteira.
    pub fn clone_entries(&self) -> HashMap<String, Node> {
        self.shared.inner.read().entries.clone()
    }

    /// Serializa o estado completo como blob JSON. O blob carrega expirações
    /// absolutas (não TTL relativo) para a Recovery re-derivar "já expirou"
    /// com o relógio do processo que restaura.
    pub fn save(&self) -> StoreResult<Bytes> {
        let entries = self.clone_entries();
        let blob = serde_json::to_vec(&entries)
            .map_err(|e| StoreError::SnapshotEncode(e.to_string()))?;
        Ok(Bytes::from(blob))
    }

    /// Substitui todo o conteúdo (entries + scheduler) pelo snapshot.
    ///
    /// Nodes com expiração já no passado entram no mapa mesmo assim — o Get
    /// lazy já os reporta como ausentes — e ficam registrados como vencidos
    /// no scheduler, que os retira no próximo disparo em vez de deixar
    /// entradas fantasma permanentes.
    pub fn recovery(&self, blob: &[u8]) -> StoreResult<()> {
        let entries: HashMap<String, Node> =
            serde_json::from_slice(blob).map_err(|e| StoreError::CorruptSnapshot(e.to_string()))?;

        let mut ttls = BTreeSet::new();
        for (key, node) in &entries {
            if let Some(when) = node.expires_at {
                ttls.insert(TtlEntry(when, key.clone()));
            }
        }

        let count = entries.len();
        {
            let mut inner = self.shared.inner.write();
            inner.entries = entries;
            inner.ttls = ttls;
        }
        self.shared.notify_expiry.notify_one();

        info!("recovery completa: {count} chaves restauradas");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn save_recovery_roundtrip() {
        let store = Store::new(100);
        store.set("foo", "bar", None, 1);
        store.set(
            "foo2",
            "bar2",
            Some(SystemTime::now() + Duration::from_secs(60)),
            2,
        );

        let blob = store.save().unwrap();

        let restored = Store::new(100);
        restored.recovery(&blob).unwrap();

        assert_eq!(restored.get("foo").unwrap().value, "bar");
        let res = restored.get("foo2").unwrap();
        assert_eq!(res.value, "bar2");
        assert!(res.expiration.is_some());
        assert!(res.ttl.unwrap() > 0);
    }

    #[tokio::test]
    async fn recovery_replaces_existing_contents() {
        let store = Store::new(100);
        store.set("keep", "me", None, 1);
        let blob = store.save().unwrap();

        let other = Store::new(100);
        other.set("old", "data", None, 1);
        other.recovery(&blob).unwrap();

        assert_eq!(other.get("keep").unwrap().value, "me");
        assert!(other.get("old").is_err());
    }

    #[tokio::test]
    async fn recovery_rejects_corrupt_blob() {
        let store = Store::new(100);
        let err = store.recovery(b"{\"foo\": not json").unwrap_err();
        assert!(matches!(err, StoreError::CorruptSnapshot(_)));

        // Conteúdo intacto após a falha
        store.set("foo", "bar", None, 1);
        assert!(store.recovery(b"garbage").is_err());
        assert_eq!(store.get("foo").unwrap().value, "bar");
    }

    #[tokio::test]
    async fn recovery_reaps_nodes_expired_while_saved() {
        let store = Store::new(100);
        store.set("foo", "bar", None, 1);
        store.set(
            "foo2",
            "bar2",
            Some(SystemTime::now() + Duration::from_millis(50)),
            2,
        );
        let blob = store.save().unwrap();

        // foo2 expira "durante o downtime"
        tokio::time::sleep(Duration::from_millis(150)).await;

        let restored = Store::new(100);
        restored.recovery(&blob).unwrap();

        // Invisível imediatamente (check lazy)...
        assert!(restored.get("foo2").is_err());
        assert_eq!(restored.get("foo").unwrap().value, "bar");

        // ...e retirada do mapa pela purga logo em seguida
        tokio::time::sleep(Duration::from_millis(150)).await;
        let entries = restored.clone_entries();
        assert!(!entries.contains_key("foo2"));
        assert!(entries.contains_key("foo"));
    }

    #[tokio::test]
    async fn clone_entries_is_independent_copy() {
        let store = Store::new(100);
        store.set("foo", "bar", None, 1);

        let copy = store.clone_entries();
        store.set("foo", "changed", None, 2);

        assert_eq!(copy.get("foo").unwrap().value, "bar");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn save_consistent_under_concurrent_writes() {
        let store = Store::new(100);
        for i in 0..100 {
            store.set(&format!("key-{i}"), "v", None, i);
        }

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for round in 0..50u64 {
                    for i in 0..100 {
                        store.set(&format!("key-{i}"), "v", None, round * 100 + i);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        // Cada snapshot parseia e contém nodes íntegros (sem leitura rasgada)
        for _ in 0..20 {
            let blob = store.save().unwrap();
            let entries: HashMap<String, Node> = serde_json::from_slice(&blob).unwrap();
            for node in entries.values() {
                assert_eq!(node.value, "v");
            }
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
    }
}
