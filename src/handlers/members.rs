// src/handlers/members.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::rbac::{RequireRole, StaffOnly},
    models::{dues::Due, member::MemberActivation},
};

// POST /api/alumnos/activar
#[utoipa::path(
    post,
    path = "/api/alumnos/activar",
    tag = "Alumnos",
    request_body = MemberActivation,
    responses(
        (status = 201, description = "Alumno activado; devuelve su primera cuota", body = Due),
        (status = 400, description = "Grupo completo o DNI inválido"),
        (status = 404, description = "Persona, trabajo, suscripción u horario inexistente"),
        (status = 409, description = "La persona ya es alumno"),
        (status = 422, description = "Datos inválidos")
    ),
    security(("api_jwt" = []))
)]
pub async fn activate_member(
    State(app_state): State<AppState>,
    _guard: RequireRole<StaffOnly>,
    Json(payload): Json<MemberActivation>,
) -> Result<impl IntoResponse, AppError> {
    let due = app_state.dues_service.activate_member(&payload).await?;
    Ok((StatusCode::CREATED, Json(due)))
}
