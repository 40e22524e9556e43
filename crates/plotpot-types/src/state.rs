use serde::{Deserialize, Serialize};

/// Lifecycle of one logical fetch or mutation, as observed by the UI.
///
/// Transitions are `Initial -> Loading -> Success | Error`; a new operation may
/// restart the cycle from any state. Every operation that publishes `Loading`
/// must end in `Success` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data")]
pub enum UiState<T> {
    Initial,
    Loading,
    Success(T),
    Error(String),
}

impl<T> Default for UiState<T> {
    fn default() -> Self {
        Self::Initial
    }
}

impl<T> UiState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// True once the operation has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_success(self) -> Option<T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> UiState<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Initial => UiState::Initial,
            Self::Loading => UiState::Loading,
            Self::Success(data) => UiState::Success(f(data)),
            Self::Error(message) => UiState::Error(message),
        }
    }

    /// Settle a result into `Success` or `Error`, rendering the error with
    /// `message`.
    pub fn from_result<E, F>(result: Result<T, E>, message: F) -> Self
    where
        F: FnOnce(E) -> String,
    {
        match result {
            Ok(data) => Self::Success(data),
            Err(e) => Self::Error(message(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_initial() {
        let state: UiState<u8> = UiState::default();
        assert_eq!(state, UiState::Initial);
        assert!(!state.is_settled());
    }

    #[test]
    fn map_preserves_variant() {
        assert_eq!(UiState::Success(2).map(|n| n * 10), UiState::Success(20));
        assert_eq!(UiState::<u8>::Loading.map(|n| n * 10), UiState::Loading);
        assert_eq!(
            UiState::<u8>::Error("boom".into()).map(|n| n * 10),
            UiState::Error("boom".into())
        );
    }

    #[test]
    fn from_result_settles() {
        let ok: UiState<u8> = UiState::from_result(Ok::<_, String>(1), |e| e);
        let err: UiState<u8> = UiState::from_result(Err("down".to_string()), |e| format!("Failed: {e}"));
        assert_eq!(ok.success(), Some(&1));
        assert_eq!(err.error(), Some("Failed: down"));
        assert!(err.is_settled());
    }

    #[test]
    fn serializes_with_tag() {
        let json = serde_json::to_value(UiState::Success(vec![1, 2])).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "Success", "data": [1, 2] }));
    }
}
