// src/services/dues_service.rs

use chrono::{Local, NaiveDate, NaiveDateTime};
use validator::Validate;

use crate::{
    common::error::AppError,
    db::SharedLedger,
    models::{
        dues::{Due, DuePeriod, DueUpdate, PaymentMethod, SettleOutcome, Settlement},
        member::MemberActivation,
    },
};

/// Gerador de cuotas + caminho manual do conciliador + manutenção administrativa.
#[derive(Clone)]
pub struct DuesService {
    store: SharedLedger,
}

impl DuesService {
    pub fn new(store: SharedLedger) -> Self {
        Self { store }
    }

    // =========================================================================
    //  GERAÇÃO MENSAL
    // =========================================================================

    /// Entrada do agendador: nunca falha, devolve 0 se algo der errado.
    pub async fn generate_monthly_dues(&self) -> u64 {
        self.generate_monthly_dues_on(Local::now().date_naive()).await
    }

    pub async fn generate_monthly_dues_on(&self, today: NaiveDate) -> u64 {
        match self.try_generate_monthly_dues_on(today).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!("❌ Falha na geração de cuotas ({}): {}", today, e);
                0
            }
        }
    }

    pub async fn try_generate_monthly_dues_on(&self, today: NaiveDate) -> Result<u64, AppError> {
        let period = DuePeriod::starting(today);
        let created = self.store.insert_monthly_dues(&period).await?;

        tracing::info!(
            created,
            label = %period.label,
            year = period.year,
            "🧾 Geração de cuotas concluída"
        );

        Ok(created)
    }

    // =========================================================================
    //  CONSULTAS
    // =========================================================================

    pub async fn find_due(&self, due_id: i32) -> Result<Due, AppError> {
        self.store
            .find_due(due_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cuota {}", due_id)))
    }

    pub async fn due_paid_status(&self, due_id: i32) -> Result<bool, AppError> {
        Ok(self.find_due(due_id).await?.paid)
    }

    pub async fn dues_by_member(&self, dni: &str) -> Result<Vec<Due>, AppError> {
        self.store.dues_by_member(dni).await
    }

    // =========================================================================
    //  PAGAMENTO MANUAL (staff)
    // =========================================================================

    /// `true` se a cuota passou a paga agora, `false` se já estava paga.
    pub async fn mark_due_paid_manually(&self, due_id: i32, method: &str) -> Result<bool, AppError> {
        self.mark_due_paid_manually_at(due_id, method, Local::now().naive_local()).await
    }

    pub async fn mark_due_paid_manually_at(
        &self,
        due_id: i32,
        method: &str,
        now: NaiveDateTime,
    ) -> Result<bool, AppError> {
        let method: PaymentMethod = method.parse()?;

        let settlement = Settlement { method, paid_at: now };

        match self.store.settle_due(due_id, &settlement).await? {
            SettleOutcome::Applied(due) => {
                tracing::info!(due_id, amount = %due.amount, method = %method, "✅ Cuota marcada como paga manualmente");
                Ok(true)
            }
            SettleOutcome::AlreadyPaid(_) => {
                tracing::info!(due_id, "ℹ️ Cuota já estava paga");
                Ok(false)
            }
            SettleOutcome::NotFound => Err(AppError::NotFound(format!("Cuota {}", due_id))),
        }
    }

    // =========================================================================
    //  ALUMNOS E EDIÇÃO
    // =========================================================================

    pub async fn activate_member(&self, activation: &MemberActivation) -> Result<Due, AppError> {
        self.activate_member_on(activation, Local::now().date_naive()).await
    }

    pub async fn activate_member_on(
        &self,
        activation: &MemberActivation,
        today: NaiveDate,
    ) -> Result<Due, AppError> {
        activation.validate()?;
        if !activation.has_numeric_dni() {
            return Err(AppError::BusinessRule("El DNI debe contener sólo dígitos.".into()));
        }

        let due = self
            .store
            .activate_member(activation, &DuePeriod::starting(today))
            .await?;

        tracing::info!(dni = %activation.dni, due_id = due.id, "🏋️ Alumno ativado com primeira cuota");
        Ok(due)
    }

    pub async fn update_due(&self, due_id: i32, update: &DueUpdate) -> Result<Due, AppError> {
        self.store.update_due(due_id, update, Local::now().naive_local()).await
    }

    pub async fn delete_due(&self, due_id: i32) -> Result<(), AppError> {
        self.store.delete_due(due_id).await?;
        tracing::warn!(due_id, "🗑️ Cuota removida manualmente");
        Ok(())
    }
}
