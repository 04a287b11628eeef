// src/handlers/dues.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{AdminOnly, MemberOnly, RequireRole, StaffOnly},
    },
    models::{
        auth::Role,
        dues::{Due, DueUpdate},
        payments::{DueStatusResponse, ManualPaymentPayload, ManualPaymentResponse},
    },
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    #[schema(example = 37)]
    pub created: u64,
}

// GET /api/cuotas/mis-cuotas
#[utoipa::path(
    get,
    path = "/api/cuotas/mis-cuotas",
    tag = "Cuotas",
    responses(
        (status = 200, description = "Cuotas del alumno autenticado", body = Vec<Due>),
        (status = 401, description = "No autenticado"),
        (status = 403, description = "Sólo para alumnos")
    ),
    security(("api_jwt" = []))
)]
pub async fn my_dues(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    _guard: RequireRole<MemberOnly>,
) -> Result<impl IntoResponse, AppError> {
    let dues = app_state.dues_service.dues_by_member(&user.0.dni).await?;
    Ok(Json(dues))
}

// GET /api/cuotas/alumno/{dni}
#[utoipa::path(
    get,
    path = "/api/cuotas/alumno/{dni}",
    tag = "Cuotas",
    params(("dni" = String, Path, description = "DNI del alumno")),
    responses((status = 200, description = "Cuotas del alumno", body = Vec<Due>)),
    security(("api_jwt" = []))
)]
pub async fn dues_by_member(
    State(app_state): State<AppState>,
    _guard: RequireRole<StaffOnly>,
    Path(dni): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let dues = app_state.dues_service.dues_by_member(&dni).await?;
    Ok(Json(dues))
}

// GET /api/cuotas/{id}/estado
#[utoipa::path(
    get,
    path = "/api/cuotas/{id}/estado",
    tag = "Cuotas",
    params(("id" = i32, Path, description = "ID de la cuota")),
    responses(
        (status = 200, description = "Estado de pago", body = DueStatusResponse),
        (status = 404, description = "Cuota no encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn due_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(due_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let due = app_state.dues_service.find_due(due_id).await?;

    if user.0.role == Role::Alumno && due.member_dni != user.0.dni {
        return Err(AppError::Forbidden);
    }

    Ok(Json(DueStatusResponse { due_id, paid: due.paid }))
}

// POST /api/cuotas/{id}/pagar
#[utoipa::path(
    post,
    path = "/api/cuotas/{id}/pagar",
    tag = "Cuotas",
    params(("id" = i32, Path, description = "ID de la cuota")),
    request_body = ManualPaymentPayload,
    responses(
        (status = 200, description = "Pago registrado (applied=false si ya estaba pagada)", body = ManualPaymentResponse),
        (status = 400, description = "Método de pago desconocido"),
        (status = 404, description = "Cuota no encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_paid(
    State(app_state): State<AppState>,
    _guard: RequireRole<StaffOnly>,
    Path(due_id): Path<i32>,
    Json(payload): Json<ManualPaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let applied = app_state
        .dues_service
        .mark_due_paid_manually(due_id, &payload.payment_method)
        .await?;

    Ok(Json(ManualPaymentResponse { due_id, applied }))
}

// PUT /api/cuotas/{id}
#[utoipa::path(
    put,
    path = "/api/cuotas/{id}",
    tag = "Cuotas",
    params(("id" = i32, Path, description = "ID de la cuota")),
    request_body = DueUpdate,
    responses(
        (status = 200, description = "Cuota actualizada", body = Due),
        (status = 400, description = "Cuota ya facturada o datos inconsistentes"),
        (status = 404, description = "Cuota no encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_due(
    State(app_state): State<AppState>,
    _guard: RequireRole<StaffOnly>,
    Path(due_id): Path<i32>,
    Json(payload): Json<DueUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let due = app_state.dues_service.update_due(due_id, &payload).await?;
    Ok(Json(due))
}

// DELETE /api/cuotas/{id}
#[utoipa::path(
    delete,
    path = "/api/cuotas/{id}",
    tag = "Cuotas",
    params(("id" = i32, Path, description = "ID de la cuota")),
    responses(
        (status = 204, description = "Cuota eliminada"),
        (status = 400, description = "Cuota ya facturada"),
        (status = 404, description = "Cuota no encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_due(
    State(app_state): State<AppState>,
    _guard: RequireRole<StaffOnly>,
    Path(due_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    app_state.dues_service.delete_due(due_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/cuotas/generar
#[utoipa::path(
    post,
    path = "/api/cuotas/generar",
    tag = "Cuotas",
    responses((status = 200, description = "Cuotas creadas en esta ejecución", body = GenerationResponse)),
    security(("api_jwt" = []))
)]
pub async fn generate_dues(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
) -> Result<impl IntoResponse, AppError> {
    let today = chrono::Local::now().date_naive();
    let created = app_state.dues_service.try_generate_monthly_dues_on(today).await?;
    Ok(Json(GenerationResponse { created }))
}
