// src/services/billing_service.rs

use chrono::{Local, NaiveDate, Utc};

use crate::{
    common::error::AppError,
    db::SharedLedger,
    models::billing::{BillingPeriod, Invoice, InvoiceReport},
};

/// Cierre de facturación: agrupa o backlog digital por titular.
#[derive(Clone)]
pub struct BillingService {
    store: SharedLedger,
}

impl BillingService {
    pub fn new(store: SharedLedger) -> Self {
        Self { store }
    }

    /// Entrada em lote: erros viram lista vazia.
    pub async fn close_period(&self, start: NaiveDate, end: NaiveDate) -> Vec<Invoice> {
        match self.try_close_period(start, end).await {
            Ok(invoices) => invoices,
            Err(e) => {
                tracing::error!("❌ Falha no cierre {}..{}: {}", start, end, e);
                Vec::new()
            }
        }
    }

    /// Mesma operação, propagando o erro (ação disparada pelo admin).
    pub async fn try_close_period(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Invoice>, AppError> {
        let period = BillingPeriod::new(start, end).ok_or_else(|| {
            AppError::BusinessRule("La fecha de inicio no puede ser posterior a la fecha de fin.".into())
        })?;

        self.close(&period).await
    }

    /// Disparo automático: dia 1 e dia 15. Qualquer outro dia não faz nada.
    pub async fn close_scheduled_period(&self) -> Vec<Invoice> {
        self.close_scheduled_period_on(Local::now().date_naive()).await
    }

    pub async fn close_scheduled_period_on(&self, today: NaiveDate) -> Vec<Invoice> {
        let Some(period) = BillingPeriod::for_trigger_date(today) else {
            tracing::info!("Dia {} não é dia de cierre; nada a fazer", today);
            return Vec::new();
        };

        match self.close(&period).await {
            Ok(invoices) => invoices,
            Err(e) => {
                tracing::error!("❌ Falha no cierre automático {}..{}: {}", period.start, period.end, e);
                Vec::new()
            }
        }
    }

    async fn close(&self, period: &BillingPeriod) -> Result<Vec<Invoice>, AppError> {
        let invoices = self.store.close_backlog(period, Utc::now()).await?;

        if invoices.is_empty() {
            tracing::info!(start = %period.start, end = %period.end, "Nenhuma cuota digital pendente de facturación");
        } else {
            let dues: i32 = invoices.iter().map(|i| i.due_count).sum();
            tracing::info!(
                start = %period.start,
                end = %period.end,
                invoices = invoices.len(),
                dues,
                "📑 Cierre de facturación concluído"
            );
        }

        Ok(invoices)
    }

    pub async fn invoice_report(&self, invoice_id: i32) -> Result<InvoiceReport, AppError> {
        self.store
            .invoice_report(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Facturación {}", invoice_id)))
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, AppError> {
        self.store.list_invoices().await
    }
}
