// src/db/store.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{
    common::error::AppError,
    models::{
        billing::{BillingPeriod, Invoice, InvoiceReport},
        dues::{Due, DuePeriod, DueUpdate, SettleOutcome, Settlement},
        member::{resolve_titular, GroupAssignment, MemberActivation, MemberContact, Titular},
    },
};

/// Operações atômicas sobre o livro de cuotas e facturación.
///
/// Cada método é uma unidade transacional completa: quem chama nunca
/// observa um lote pela metade.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Cria uma cuota pendente para cada alumno ativo que ainda não tem
    /// cuota para (`period.label`, `period.year`). Devolve quantas foram criadas.
    async fn insert_monthly_dues(&self, period: &DuePeriod) -> Result<u64, AppError>;

    async fn find_due(&self, due_id: i32) -> Result<Option<Due>, AppError>;

    /// Cuotas do alumno, vencimento mais recente primeiro.
    async fn dues_by_member(&self, dni: &str) -> Result<Vec<Due>, AppError>;

    /// Transição PENDING -> PAID com recargo, protegida por `paid = false`.
    async fn settle_due(&self, due_id: i32, settlement: &Settlement) -> Result<SettleOutcome, AppError>;

    async fn member_contact(&self, dni: &str) -> Result<Option<MemberContact>, AppError>;

    async fn group_assignments(&self, dni: &str) -> Result<Vec<GroupAssignment>, AppError>;

    async fn titular_for_member(&self, dni: &str) -> Result<Titular, AppError> {
        let assignments = self.group_assignments(dni).await?;
        Ok(resolve_titular(&assignments))
    }

    /// Seleciona todas as cuotas pagas, digitais e não facturadas, agrupa por
    /// titular, grava uma factura por grupo e marca as cuotas.
    async fn close_backlog(
        &self,
        period: &BillingPeriod,
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError>;

    async fn invoice_report(&self, invoice_id: i32) -> Result<Option<InvoiceReport>, AppError>;

    async fn list_invoices(&self) -> Result<Vec<Invoice>, AppError>;

    /// Promove uma persona a alumno ativo e cria a primeira cuota.
    async fn activate_member(
        &self,
        activation: &MemberActivation,
        first_period: &DuePeriod,
    ) -> Result<Due, AppError>;

    async fn update_due(&self, due_id: i32, update: &DueUpdate, now: NaiveDateTime) -> Result<Due, AppError>;

    async fn delete_due(&self, due_id: i32) -> Result<(), AppError>;
}

pub type SharedLedger = Arc<dyn LedgerStore>;
