// src/startup.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc, handlers, middleware::auth::auth_guard};

pub fn build_router(app_state: AppState) -> Router {
    // Rotas protegidas por JWT; o papel é checado em cada handler (RequireRole)
    let member_routes = Router::new()
        .route("/activar", post(handlers::members::activate_member));

    let dues_routes = Router::new()
        .route("/mis-cuotas", get(handlers::dues::my_dues))
        .route("/alumno/{dni}", get(handlers::dues::dues_by_member))
        .route("/generar", post(handlers::dues::generate_dues))
        .route("/{id}/estado", get(handlers::dues::due_status))
        .route("/{id}/pagar", post(handlers::dues::mark_paid))
        .route(
            "/{id}",
            put(handlers::dues::update_due).delete(handlers::dues::delete_due),
        );

    let billing_routes = Router::new()
        .route("/", get(handlers::billing::list_invoices))
        .route("/generar-cierre", post(handlers::billing::close_period))
        .route("/reporte/{id}", get(handlers::billing::invoice_report))
        .route("/reporte/{id}/pdf", get(handlers::billing::invoice_pdf));

    let protected_payment_routes = Router::new()
        .route("/crear-preferencia/{id}", post(handlers::payments::create_preference));

    let protected = Router::new()
        .nest("/alumnos", member_routes)
        .nest("/cuotas", dues_routes)
        .nest("/facturacion", billing_routes)
        .nest("/pagos", protected_payment_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Chamadas do gateway e do navegador voltando do checkout: sem token
    let public_payment_routes = Router::new()
        .route("/webhook", post(handlers::payments::webhook))
        .route("/retorno", get(handlers::payments::payment_return));

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/pagos", public_payment_routes)
        .nest("/api", protected)
        .with_state(app_state)
}
