use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GardenClientError {
    // Сетевые ошибки: запрос не получил ответа
    #[error("Network failure: {0}")]
    Network(#[from] reqwest::Error),

    // HTTP ошибки
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Ошибки валидации на стороне клиента
    #[error("Validation error: {0}")]
    Validation(String),

    // Ответ сервера не совпал с ожидаемой схемой
    #[error("Unexpected response from {path}: {message}")]
    Decode { path: String, message: String },

    // Ошибки URI
    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    // Ошибки хранилища сессии
    #[error("Session storage error: {0}")]
    Storage(String),

    // Ошибки сериализации
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GardenClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GardenClientError::Http { status: 404, .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GardenClientError::Unauthorized(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GardenClientError::Validation(_))
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GardenClientError::Http { status, .. } => Some(*status),
            GardenClientError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }

    /// Builds the error for a non-2xx response from its status and raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = error_message(status, body);
        if status == 401 {
            GardenClientError::Unauthorized(message)
        } else {
            GardenClientError::Http { status, message }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

/// Best-effort human readable message: JSON `msg`/`error`/`message`, then raw text,
/// then the canonical reason phrase.
pub(crate) fn error_message(status: u16, body: &str) -> String {
    let body = body.trim();

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.msg.or(parsed.error).or(parsed.message) {
            return message;
        }
    }

    if !body.is_empty() {
        return body.to_string();
    }

    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_prefers_json_fields() {
        assert_eq!(
            error_message(400, r#"{"msg": "Username already exists"}"#),
            "Username already exists"
        );
        assert_eq!(
            error_message(400, r#"{"error": "Plant name is required"}"#),
            "Plant name is required"
        );
        assert_eq!(error_message(500, r#"{"message": "boom"}"#), "boom");
    }

    #[test]
    fn message_falls_back_to_text_then_reason() {
        assert_eq!(error_message(502, "upstream down"), "upstream down");
        assert_eq!(error_message(404, ""), "Not Found");
        assert_eq!(error_message(500, r#"{"detail": "x"}"#), r#"{"detail": "x"}"#);
    }

    #[test]
    fn status_401_maps_to_unauthorized() {
        let err = GardenClientError::from_response(401, r#"{"msg": "Token has expired"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "Unauthorized: Token has expired");

        let err = GardenClientError::from_response(404, "");
        assert!(err.is_not_found());
        assert!(!err.is_unauthorized());
    }
}
