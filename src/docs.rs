// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Alumnos ---
        handlers::members::activate_member,

        // --- Cuotas ---
        handlers::dues::my_dues,
        handlers::dues::dues_by_member,
        handlers::dues::due_status,
        handlers::dues::mark_paid,
        handlers::dues::update_due,
        handlers::dues::delete_due,
        handlers::dues::generate_dues,

        // --- Pagos ---
        handlers::payments::create_preference,
        handlers::payments::webhook,
        handlers::payments::payment_return,

        // --- Facturación ---
        handlers::billing::close_period,
        handlers::billing::list_invoices,
        handlers::billing::invoice_report,
        handlers::billing::invoice_pdf,
    ),
    components(
        schemas(
            // --- Cuotas ---
            models::dues::PaymentMethod,
            models::dues::Due,
            models::dues::DueUpdate,
            handlers::dues::GenerationResponse,

            // --- Alumnos ---
            models::member::ScheduleSlot,
            models::member::MemberActivation,

            // --- Pagos ---
            models::payments::PaymentPreference,
            models::payments::CreatePreferencePayload,
            models::payments::ManualPaymentPayload,
            models::payments::ManualPaymentResponse,
            models::payments::DueStatusResponse,

            // --- Facturación ---
            models::billing::Invoice,
            models::billing::InvoiceDetailRow,
            models::billing::InvoiceReport,
        )
    ),
    tags(
        (name = "Alumnos", description = "Alta de alumnos activos"),
        (name = "Cuotas", description = "Generación, consulta y pago manual de cuotas"),
        (name = "Pagos", description = "Pagos digitales vía Mercado Pago"),
        (name = "Facturación", description = "Cierres quincenales por titular")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
