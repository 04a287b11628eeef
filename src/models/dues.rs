// src/models/dues.rs

use std::{fmt, str::FromStr};

use chrono::{Datelike, Days, Locale, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;

/// Duração fixa de uma cuota (não acompanha o mês calendário).
pub const DUE_PERIOD_DAYS: u64 = 30;

/// Multiplicador aplicado a cuotas pagas depois do vencimento (10%).
pub fn late_surcharge_rate() -> Decimal {
    Decimal::new(110, 2)
}

/// Nome do mês em espanhol, com inicial maiúscula ("Marzo").
pub fn month_label(day: NaiveDate) -> String {
    let month = day.format_localized("%B", Locale::es_AR).to_string();
    let mut chars = month.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => month,
    }
}

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[sqlx(rename = "efectivo")]
    #[serde(rename = "efectivo")]
    Cash,
    #[sqlx(rename = "transferencia")]
    #[serde(rename = "transferencia")]
    Transfer,
    Qr,
}

impl PaymentMethod {
    /// QR/billetera e transferência entram no cierre automático; efectivo não.
    pub fn is_digital(self) -> bool {
        matches!(self, PaymentMethod::Qr | PaymentMethod::Transfer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "efectivo",
            PaymentMethod::Transfer => "transferencia",
            PaymentMethod::Qr => "qr",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Método de pago desconocido: '{0}'")]
pub struct UnknownPaymentMethod(pub String);

impl FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;

    // O staff digita o método livremente ("Efectivo", "Transferencia", "QR"...)
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "efectivo" | "cash" | "contado" => Ok(PaymentMethod::Cash),
            "transferencia" | "transfer" | "transferencia bancaria" => Ok(PaymentMethod::Transfer),
            "qr" | "mercadopago" | "mercado pago" | "billetera" => Ok(PaymentMethod::Qr),
            _ => Err(UnknownPaymentMethod(raw.trim().to_string())),
        }
    }
}

// --- Structs ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Due {
    #[schema(example = 42)]
    pub id: i32,

    #[schema(example = "30111222")]
    pub member_dni: String,

    pub paid: bool,

    #[schema(example = "20000.00")]
    pub amount: Decimal,

    #[schema(value_type = String, format = Date, example = "2025-03-01")]
    pub period_start: NaiveDate,
    // Vencimento
    #[schema(value_type = String, format = Date, example = "2025-03-31")]
    pub period_end: NaiveDate,

    #[schema(example = "Marzo")]
    pub period_label: String,
    #[schema(example = 2025)]
    pub period_year: i32,

    // Snapshot do catálogo no momento da criação
    #[schema(example = "Musculación")]
    pub job_name: String,
    #[schema(example = "3 días")]
    pub plan_name: String,

    #[schema(value_type = Option<String>, format = Date)]
    pub payment_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, example = "18:30:00")]
    pub payment_time: Option<NaiveTime>,
    pub payment_method: Option<PaymentMethod>,

    pub invoiced: bool,
    pub invoice_id: Option<i32>,
}

impl Due {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.period_end < today
    }

    /// Valor a cobrar se a cuota for paga em `today`.
    pub fn amount_due_on(&self, today: NaiveDate) -> Decimal {
        amount_due_on(self.amount, self.period_end, today)
    }

    /// Aplica a transição PENDING -> PAID. Só é chamada com a linha travada e `paid = false`.
    pub fn settled(&self, settlement: &Settlement) -> Due {
        Due {
            paid: true,
            amount: self.amount_due_on(settlement.paid_at.date()),
            payment_date: Some(settlement.paid_at.date()),
            payment_time: Some(settlement.paid_at.time()),
            payment_method: Some(settlement.method),
            ..self.clone()
        }
    }
}

/// Regra de recargo: vencida (fim do período estritamente antes de hoje) => +10%, 2 casas.
pub fn amount_due_on(amount: Decimal, period_end: NaiveDate, today: NaiveDate) -> Decimal {
    if period_end < today {
        (amount * late_surcharge_rate()).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    } else {
        amount
    }
}

/// Período de cobrança de uma nova cuota: começa hoje e vence em 30 dias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
    pub year: i32,
}

impl DuePeriod {
    pub fn starting(today: NaiveDate) -> Self {
        Self {
            start: today,
            end: today + Days::new(DUE_PERIOD_DAYS),
            label: month_label(today),
            year: today.year(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub method: PaymentMethod,
    pub paid_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// Transição aplicada agora (com recargo, se vencida).
    Applied(Due),
    /// Já estava paga: nada muda.
    AlreadyPaid(Due),
    NotFound,
}

impl SettleOutcome {
    pub fn was_applied(&self) -> bool {
        matches!(self, SettleOutcome::Applied(_))
    }
}

// Edição administrativa (fora do fluxo de conciliação)
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DueUpdate {
    #[schema(example = "21000.00")]
    pub amount: Option<Decimal>,
    pub paid: Option<bool>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DueUpdateError {
    #[error("La cuota {0} ya fue facturada y no puede modificarse.")]
    AlreadyInvoiced(i32),
    #[error("Debe indicar el método de pago para marcar la cuota como pagada.")]
    MissingPaymentMethod,
    #[error("El monto no puede ser negativo.")]
    NegativeAmount,
}

impl DueUpdate {
    /// Calcula o novo estado mantendo o invariante `paid=false => campos de pagamento nulos`.
    pub fn apply_to(&self, due: &Due, now: NaiveDateTime) -> Result<Due, DueUpdateError> {
        if due.invoiced {
            return Err(DueUpdateError::AlreadyInvoiced(due.id));
        }
        let mut updated = due.clone();

        if let Some(amount) = self.amount {
            if amount.is_sign_negative() {
                return Err(DueUpdateError::NegativeAmount);
            }
            updated.amount = amount.round_dp(2);
        }

        match self.paid.unwrap_or(due.paid) {
            false => {
                updated.paid = false;
                updated.payment_date = None;
                updated.payment_time = None;
                updated.payment_method = None;
            }
            true if !due.paid => {
                let method = self.payment_method.ok_or(DueUpdateError::MissingPaymentMethod)?;
                updated.paid = true;
                updated.payment_date = Some(now.date());
                updated.payment_time = Some(now.time());
                updated.payment_method = Some(method);
            }
            true => {
                if let Some(method) = self.payment_method {
                    updated.payment_method = Some(method);
                }
            }
        }

        Ok(updated)
    }
}
