/// Erros do engine de dados.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("chave não encontrada")]
    KeyNotFound,
    #[error("comparação falhou: esperado '{expected}', valor atual '{actual}'")]
    TestFailed { expected: String, actual: String },
    #[error("snapshot corrompido: {0}")]
    CorruptSnapshot(String),
    #[error("falha ao serializar snapshot: {0}")]
    SnapshotEncode(String),
}

/// Result type alias.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_not_found_display() {
        let err = StoreError::KeyNotFound;
        assert_eq!(err.to_string(), "chave não encontrada");
    }

    #[test]
    fn test_failed_display() {
        let err = StoreError::TestFailed {
            expected: "bar".into(),
            actual: "barbar".into(),
        };
        assert_eq!(
            err.to_string(),
            "comparação falhou: esperado 'bar', valor atual 'barbar'"
        );
    }

    #[test]
    fn corrupt_snapshot_display() {
        let err = StoreError::CorruptSnapshot("EOF".into());
        assert_eq!(err.to_string(), "snapshot corrompido: EOF");
    }
}
