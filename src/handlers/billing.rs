// src/handlers/billing.rs

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::rbac::{AdminOnly, RequireRole},
    models::billing::{ClosePeriodQuery, Invoice, InvoiceReport},
};

// POST /api/facturacion/generar-cierre?fecha_inicio=...&fecha_fin=...
#[utoipa::path(
    post,
    path = "/api/facturacion/generar-cierre",
    tag = "Facturación",
    params(ClosePeriodQuery),
    responses(
        (status = 200, description = "Facturas emitidas (vacío si no hay cuotas digitales pendientes)", body = Vec<Invoice>),
        (status = 400, description = "Período inválido")
    ),
    security(("api_jwt" = []))
)]
pub async fn close_period(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    Query(query): Query<ClosePeriodQuery>,
) -> Result<impl IntoResponse, AppError> {
    let invoices = app_state
        .billing_service
        .try_close_period(query.fecha_inicio, query.fecha_fin)
        .await?;

    Ok(Json(invoices))
}

// GET /api/facturacion
#[utoipa::path(
    get,
    path = "/api/facturacion",
    tag = "Facturación",
    responses((status = 200, description = "Facturas, la más reciente primero", body = Vec<Invoice>)),
    security(("api_jwt" = []))
)]
pub async fn list_invoices(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
) -> Result<impl IntoResponse, AppError> {
    let invoices = app_state.billing_service.list_invoices().await?;
    Ok(Json(invoices))
}

// GET /api/facturacion/reporte/{id}
#[utoipa::path(
    get,
    path = "/api/facturacion/reporte/{id}",
    tag = "Facturación",
    params(("id" = i32, Path, description = "ID de la facturación")),
    responses(
        (status = 200, description = "Detalle de la facturación", body = InvoiceReport),
        (status = 404, description = "Facturación no encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn invoice_report(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    Path(invoice_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let report = app_state.billing_service.invoice_report(invoice_id).await?;
    Ok(Json(report))
}

// GET /api/facturacion/reporte/{id}/pdf
#[utoipa::path(
    get,
    path = "/api/facturacion/reporte/{id}/pdf",
    tag = "Facturación",
    params(("id" = i32, Path, description = "ID de la facturación")),
    responses(
        (status = 200, description = "PDF de la facturación", content_type = "application/pdf"),
        (status = 404, description = "Facturación no encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn invoice_pdf(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    Path(invoice_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let report = app_state.billing_service.invoice_report(invoice_id).await?;

    // Renderização do PDF é CPU-bound: roda fora do runtime
    let documents = app_state.document_service.clone();
    let pdf_bytes = tokio::task::spawn_blocking(move || documents.render_invoice_pdf(&report))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de renderização: {}", e))??;

    // Configura os Headers para o navegador baixar ou mostrar o PDF
    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"facturacion_{}.pdf\"", invoice_id),
        ),
    ];

    Ok((headers, pdf_bytes))
}
