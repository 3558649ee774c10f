use crate::key::StateKey;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("unknown state key `{0}`")]
    InvalidKey(String),
    #[error("value for `{key}` must be {expected}")]
    TypeMismatch {
        key: StateKey,
        expected: &'static str,
    },
    #[error("invalid dashboard config: {0}")]
    Config(#[from] serde_json::Error),
}
