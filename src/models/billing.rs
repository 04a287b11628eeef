// src/models/billing.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::models::{dues::PaymentMethod, member::Titular};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[schema(example = 12)]
    pub id: i32,

    #[schema(value_type = String, format = Date, example = "2025-03-01")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-03-15")]
    pub period_end: NaiveDate,

    pub generated_at: DateTime<Utc>,

    #[schema(example = "36500.00")]
    pub total_amount: Decimal,
    #[schema(example = 2)]
    pub due_count: i32,

    #[schema(example = "Administración")]
    pub titular: String,
    /// DNI do instrutor titular; `None` quando a conta é da administração.
    #[schema(example = "20555444")]
    pub titular_dni: Option<String>,
}

/// Janela administrativa informada na facturación. Não filtra a seleção.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Período do cierre automático:
    /// dia 1 fecha 16..fim do mês anterior, dia 15 fecha 1..15 do mês corrente.
    /// Qualquer outro dia não fecha nada.
    pub fn for_trigger_date(today: NaiveDate) -> Option<Self> {
        match today.day() {
            1 => {
                let end = today - Days::new(1);
                let start = end.with_day(16)?;
                Some(Self { start, end })
            }
            15 => Some(Self { start: today.with_day(1)?, end: today }),
            _ => None,
        }
    }
}

/// Cuota paga, digital e ainda não facturada.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BillableDue {
    pub due_id: i32,
    pub member_dni: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDraft {
    pub titular: Titular,
    pub total_amount: Decimal,
    pub due_ids: Vec<i32>,
}

impl InvoiceDraft {
    pub fn due_count(&self) -> i32 {
        self.due_ids.len() as i32
    }
}

/// Agrupa as cuotas faturáveis por titular (ordem alfabética do titular).
/// Dois instrutores homônimos continuam sendo titulares distintos.
pub fn group_by_titular<F>(dues: &[BillableDue], mut titular_of: F) -> Vec<InvoiceDraft>
where
    F: FnMut(&str) -> Titular,
{
    let mut groups: BTreeMap<(String, Option<String>), InvoiceDraft> = BTreeMap::new();

    for due in dues {
        let titular = titular_of(&due.member_dni);
        let key = (titular.label().to_string(), titular.staff_dni().map(str::to_string));
        let draft = groups
            .entry(key)
            .or_insert_with(|| InvoiceDraft {
                titular,
                total_amount: Decimal::ZERO,
                due_ids: Vec::new(),
            });
        draft.total_amount += due.amount;
        draft.due_ids.push(due.due_id);
    }

    groups.into_values().collect()
}

/// "Concepto" de uma linha do relatório: mês + plano.
pub fn concept(period_label: &str, plan_name: &str) -> String {
    format!("{} - {}", period_label, plan_name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetailRow {
    pub due_id: i32,
    #[schema(example = "30111222")]
    pub member_dni: String,
    #[schema(example = "Juan Pérez")]
    pub member_name: String,
    #[schema(example = "16500.00")]
    pub amount: Decimal,
    #[schema(value_type = Option<String>, format = Date)]
    pub payment_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    #[schema(example = "Marzo - 3 días")]
    pub concept: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceReport {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub details: Vec<InvoiceDetailRow>,
}

// Os nomes dos parâmetros seguem a URL pública: ?fecha_inicio=...&fecha_fin=...
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClosePeriodQuery {
    #[schema(value_type = String, format = Date, example = "2025-03-01")]
    pub fecha_inicio: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-03-15")]
    pub fecha_fin: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn billable(due_id: i32, member: &str, amount: i64) -> BillableDue {
        BillableDue { due_id, member_dni: member.into(), amount: Decimal::new(amount, 0) }
    }

    #[test]
    fn first_of_month_closes_second_half_of_previous_month() {
        let period = BillingPeriod::for_trigger_date(date(2025, 3, 1)).unwrap();
        assert_eq!(period, BillingPeriod { start: date(2025, 2, 16), end: date(2025, 2, 28) });

        let period = BillingPeriod::for_trigger_date(date(2025, 1, 1)).unwrap();
        assert_eq!(period, BillingPeriod { start: date(2024, 12, 16), end: date(2024, 12, 31) });
    }

    #[test]
    fn fifteenth_closes_first_half_and_other_days_do_nothing() {
        let period = BillingPeriod::for_trigger_date(date(2025, 3, 15)).unwrap();
        assert_eq!(period, BillingPeriod { start: date(2025, 3, 1), end: date(2025, 3, 15) });

        assert_eq!(BillingPeriod::for_trigger_date(date(2025, 3, 2)), None);
        assert_eq!(BillingPeriod::for_trigger_date(date(2025, 3, 16)), None);
    }

    #[test]
    fn inverted_period_is_rejected() {
        assert!(BillingPeriod::new(date(2025, 3, 15), date(2025, 3, 1)).is_none());
        assert!(BillingPeriod::new(date(2025, 3, 1), date(2025, 3, 1)).is_some());
    }

    #[test]
    fn dues_are_grouped_and_summed_per_titular() {
        let dues = vec![
            billable(1, "30111222", 16500),
            billable(2, "30333444", 20000),
            billable(3, "30555666", 12000),
        ];
        let drafts = group_by_titular(&dues, |dni| match dni {
            "30333444" => Titular::Staff { dni: "20555444".into(), full_name: "Ana Ruiz".into() },
            _ => Titular::Administration,
        });

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].titular, Titular::Administration);
        assert_eq!(drafts[0].total_amount, Decimal::new(28500, 0));
        assert_eq!(drafts[0].due_ids, vec![1, 3]);
        assert_eq!(drafts[0].due_count(), 2);
        assert_eq!(drafts[1].titular.label(), "Ana Ruiz");
        assert_eq!(drafts[1].due_ids, vec![2]);
    }

    #[test]
    fn namesake_instructors_get_separate_drafts() {
        let dues = vec![
            billable(1, "30111222", 100),
            billable(2, "30333444", 200),
            billable(3, "30555666", 300),
        ];
        let drafts = group_by_titular(&dues, |dni| match dni {
            "30333444" => Titular::Staff { dni: "21000001".into(), full_name: "Ana Ruiz".into() },
            _ => Titular::Staff { dni: "20555444".into(), full_name: "Ana Ruiz".into() },
        });

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].titular.staff_dni(), Some("20555444"));
        assert_eq!(drafts[0].due_ids, vec![1, 3]);
        assert_eq!(drafts[0].total_amount, Decimal::new(400, 0));
        assert_eq!(drafts[1].titular.staff_dni(), Some("21000001"));
        assert_eq!(drafts[1].due_ids, vec![2]);
    }

    #[test]
    fn nothing_to_group_yields_no_drafts() {
        assert!(group_by_titular(&[], |_| Titular::Administration).is_empty());
        assert_eq!(concept("Marzo", "3 días"), "Marzo - 3 días");
    }
}
