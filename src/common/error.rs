use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::{
    models::dues::{DueUpdateError, UnknownPaymentMethod},
    services::gateway::GatewayError,
};

// Nosso tipo de erro, agora com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0} no encontrado")]
    NotFound(String),

    #[error("Ya existe un registro: {0}")]
    DuplicateEntry(String),

    #[error("{0}")]
    BusinessRule(String),

    #[error("Token inválido")]
    InvalidToken,

    #[error("No tiene permisos para realizar esta acción")]
    Forbidden,

    // Variante para erros de banco de dados (exemplo com sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Falha de comunicação com o gateway: o próprio gateway reenvia o webhook
    #[error("Erro no gateway de pagamentos: {0}")]
    Gateway(#[from] GatewayError),

    #[error("No se pudo iniciar el pago")]
    PaymentInitiation,

    #[error("Erro ao gerar documento: {0}")]
    Document(String),

    #[error("Erro no agendador: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    /// Erros que o chamador pode tentar de novo (gateway fora do ar, timeout).
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Gateway(e) if e.is_retryable())
    }
}

impl From<DueUpdateError> for AppError {
    fn from(err: DueUpdateError) -> Self {
        AppError::BusinessRule(err.to_string())
    }
}

impl From<UnknownPaymentMethod> for AppError {
    fn from(err: UnknownPaymentMethod) -> Self {
        AppError::BusinessRule(err.to_string())
    }
}

// Rejeição leve usada pelos extratores (roles, cabeçalhos).
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self { status, error: error.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors.iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Uno o más campos son inválidos.",
                    "details": details,
                }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::DuplicateEntry(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::BusinessRule(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "Token de autenticación inválido o ausente.".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::PaymentInitiation => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Gateway(ref e) => {
                tracing::error!("Erro no gateway de pagamentos: {}", e);
                let status = if e.is_retryable() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, "El servicio de pagos no está disponible.".to_string())
            }

            // Todos os outros erros (DatabaseError, InternalServerError...) viram 500.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocurrió un error inesperado.".to_string())
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
