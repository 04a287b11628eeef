// src/handlers/payments.rs

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, RawQuery, State},
    response::{IntoResponse, Redirect},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        auth::Role,
        payments::{CreatePreferencePayload, OwnerTag, PaymentNotification, PaymentPreference},
    },
};

// ---
// Notificação do gateway (query string e/ou corpo JSON)
// ---

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub owner: Option<String>,
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    topic: Option<String>,
    data: Option<WebhookData>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    id: Option<Value>,
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Junta os dois formatos do gateway (`?topic=payment&id=` e `{"type":"payment","data":{"id":..}}`).
pub fn parse_notification(query: &WebhookQuery, body: &[u8]) -> PaymentNotification {
    let body: WebhookBody = serde_json::from_slice(body).unwrap_or_default();

    let owner = match query.owner.as_deref().unwrap_or_default().parse::<OwnerTag>() {
        Ok(owner) => owner,
        Err(e) => {
            tracing::warn!("Webhook com {}; usando a conta da administração", e);
            OwnerTag::Admin
        }
    };

    let topic = query
        .topic
        .clone()
        .or_else(|| query.kind.clone())
        .or(body.kind)
        .or(body.topic);

    let payment_id = query
        .data_id
        .clone()
        .or_else(|| query.id.clone())
        .or_else(|| body.data.and_then(|d| d.id.as_ref().and_then(value_to_id)));

    PaymentNotification { owner, topic, payment_id }
}

// POST /api/pagos/crear-preferencia/{id}
#[utoipa::path(
    post,
    path = "/api/pagos/crear-preferencia/{id}",
    tag = "Pagos",
    params(("id" = i32, Path, description = "ID de la cuota")),
    request_body(content = CreatePreferencePayload, description = "Monto propuesto por el frontend (opcional)"),
    responses(
        (status = 200, description = "Preferencia creada", body = PaymentPreference),
        (status = 400, description = "La cuota ya está pagada"),
        (status = 403, description = "La cuota no pertenece al alumno"),
        (status = 404, description = "Cuota no encontrada"),
        (status = 502, description = "No se pudo iniciar el pago")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_preference(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(due_id): Path<i32>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    // Alumno só paga as próprias cuotas; staff pode gerar para qualquer um
    if user.0.role == Role::Alumno {
        let due = app_state.dues_service.find_due(due_id).await?;
        if due.member_dni != user.0.dni {
            return Err(AppError::Forbidden);
        }
    }

    let payload: CreatePreferencePayload = if body.is_empty() {
        CreatePreferencePayload::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BusinessRule(format!("Cuerpo inválido: {}", e)))?
    };

    let preference = app_state
        .payment_service
        .create_payment_preference(due_id, payload.proposed_amount)
        .await?;

    Ok(Json(preference))
}

// POST /api/pagos/webhook
// Sempre 200: o gateway reenvia indefinidamente qualquer outra resposta
#[utoipa::path(
    post,
    path = "/api/pagos/webhook",
    tag = "Pagos",
    params(
        ("owner" = Option<String>, Query, description = "Cuenta receptora: 'admin' o DNI del instructor"),
        ("topic" = Option<String>, Query, description = "Tipo de notificación (IPN)"),
        ("id" = Option<String>, Query, description = "ID del pago (IPN)")
    ),
    request_body(content = String, content_type = "application/json", description = "Notificación del gateway; se acepta cualquier cuerpo"),
    responses((status = 200, description = "Notificación recibida"))
)]
pub async fn webhook(
    State(app_state): State<AppState>,
    query: Result<Query<WebhookQuery>, QueryRejection>,
    body: Bytes,
) -> impl IntoResponse {
    let query = match query {
        Ok(Query(q)) => q,
        Err(e) => {
            tracing::warn!("Query do webhook inválida: {}", e);
            WebhookQuery::default()
        }
    };

    let notification = parse_notification(&query, &body);
    tracing::info!(
        owner = %notification.owner,
        topic = ?notification.topic,
        payment_id = ?notification.payment_id,
        "🔔 Webhook do Mercado Pago recebido"
    );

    app_state.payment_service.handle_notification(&notification).await;

    Json(json!({ "status": "ok" }))
}

// GET /api/pagos/retorno
// Ponte pós-pagamento: devolve o navegador ao frontend mantendo os parâmetros do gateway
#[utoipa::path(
    get,
    path = "/api/pagos/retorno",
    tag = "Pagos",
    responses((status = 303, description = "Redirección al frontend con los parámetros del checkout"))
)]
pub async fn payment_return(State(app_state): State<AppState>, RawQuery(query): RawQuery) -> Redirect {
    Redirect::to(&app_state.settings.checkout().return_redirect(query.as_deref()))
}
