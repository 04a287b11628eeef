// src/models/payments.rs

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Status do Mercado Pago que confirma o pagamento.
pub const APPROVED_STATUS: &str = "approved";

/// Conta do gateway que recebe o dinheiro: a da administração ou a de um instrutor.
/// Viaja na URL de notificação para que o webhook consulte com as mesmas credenciais.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum OwnerTag {
    #[default]
    Admin,
    Staff(String),
}

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerTag::Admin => f.write_str("admin"),
            OwnerTag::Staff(dni) => f.write_str(dni),
        }
    }
}

impl FromStr for OwnerTag {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("admin") {
            Ok(OwnerTag::Admin)
        } else if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
            Ok(OwnerTag::Staff(raw.to_string()))
        } else {
            Err(format!("owner inválido: '{}'", raw))
        }
    }
}

// --- Payloads enviados ao gateway ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub currency_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferencePayer {
    pub name: String,
    pub surname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub payer: PreferencePayer,
    /// Único vínculo entre a notificação assíncrona e a cuota.
    pub external_reference: String,
    pub back_urls: BackUrls,
    pub auto_return: String,
    pub notification_url: String,
}

// --- Respostas do gateway ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreferenceCreated {
    pub id: String,
    pub init_point: String,
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayPayment {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub transaction_amount: Option<Decimal>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

impl GatewayPayment {
    pub fn is_approved(&self) -> bool {
        self.status == APPROVED_STATUS
    }

    pub fn due_id(&self) -> Option<i32> {
        self.external_reference.as_deref()?.trim().parse().ok()
    }
}

// --- Respostas da API ---

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPreference {
    #[schema(example = "123456789-abcd")]
    pub preference_id: String,
    #[schema(example = "https://www.mercadopago.com.ar/checkout/v1/redirect?pref_id=...")]
    pub checkout_url: String,
    pub sandbox_checkout_url: Option<String>,
    #[schema(example = "16500.00")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePreferencePayload {
    /// Valor calculado no frontend; o servidor recalcula e prevalece.
    #[schema(example = "16500.00")]
    pub proposed_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualPaymentPayload {
    #[schema(example = "Efectivo")]
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DueStatusResponse {
    pub due_id: i32,
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualPaymentResponse {
    pub due_id: i32,
    /// `false` quando a cuota já estava paga.
    pub applied: bool,
}

/// Notificação recebida do gateway (query string e/ou corpo JSON).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentNotification {
    pub owner: OwnerTag,
    pub topic: Option<String>,
    pub payment_id: Option<String>,
}

impl PaymentNotification {
    pub fn is_payment(&self) -> bool {
        matches!(self.topic.as_deref(), Some("payment"))
    }
}

/// Resultado da conciliação de um pagamento externo.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Applied { due_id: i32, amount: Decimal },
    AlreadyPaid { due_id: i32 },
    NotApproved { status: String },
    MissingReference,
    DueNotFound { due_id: i32 },
}

impl ReconcileOutcome {
    /// A cuota terminou no estado PAID (aplicado agora ou antes).
    pub fn is_settled(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. } | ReconcileOutcome::AlreadyPaid { .. })
    }
}
