// src/scheduler.rs

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::{
    common::error::AppError,
    services::{BillingService, DuesService},
};

/// Expressão cron (seg min hora dia mês dia-semana, em UTC) da geração mensal.
pub fn generation_schedule(day_of_month: u32) -> String {
    format!("0 0 6 {} * *", day_of_month)
}

/// Cierre quincenal: dias 1 e 15.
pub const CLOSING_SCHEDULE: &str = "0 30 6 1,15 * *";

/// Registra os dois jobs em lote e inicia o agendador no mesmo processo do servidor.
pub async fn start_scheduler(
    dues_service: DuesService,
    billing_service: BillingService,
    generation_day: u32,
) -> Result<JobScheduler, AppError> {
    let scheduler = JobScheduler::new().await?;

    let generation_cron = generation_schedule(generation_day);
    let generation = Job::new_async(generation_cron.as_str(), move |_uuid, _lock| {
        let dues_service = dues_service.clone();
        Box::pin(async move {
            let created = dues_service.generate_monthly_dues().await;
            tracing::info!("⏰ Geração agendada: {} cuotas criadas", created);
        })
    })?;

    let closing = Job::new_async(CLOSING_SCHEDULE, move |_uuid, _lock| {
        let billing_service = billing_service.clone();
        Box::pin(async move {
            let invoices = billing_service.close_scheduled_period().await;
            tracing::info!("⏰ Cierre agendado: {} facturas emitidas", invoices.len());
        })
    })?;

    scheduler.add(generation).await?;
    scheduler.add(closing).await?;
    scheduler.start().await?;

    tracing::info!("✅ Agendador iniciado (geração no dia {}, cierre nos dias 1 e 15)", generation_day);

    Ok(scheduler)
}
