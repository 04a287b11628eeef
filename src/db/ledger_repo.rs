// src/db/ledger_repo.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};

use crate::{
    common::error::AppError,
    db::store::LedgerStore,
    models::{
        billing::{group_by_titular, BillableDue, BillingPeriod, Invoice, InvoiceDetailRow, InvoiceReport},
        dues::{Due, DuePeriod, DueUpdate, SettleOutcome, Settlement},
        member::{resolve_titular, GroupAssignment, MemberActivation, MemberContact},
    },
};

const DUE_COLUMNS: &str = "id, member_dni, paid, amount, period_start, period_end, period_label, \
    period_year, job_name, plan_name, payment_date, payment_time, payment_method, invoiced, invoice_id";

const INVOICE_COLUMNS: &str = "id, period_start, period_end, generated_at, total_amount, due_count, titular, titular_dni";

// O repositório do livro de cuotas, responsável pelas tabelas 'dues' e 'invoices'
#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_assignments<'e, E>(
        executor: E,
        member_dnis: &[String],
    ) -> Result<Vec<GroupAssignment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignments = sqlx::query_as::<_, GroupAssignment>(
            r#"
            SELECT
                a.member_dni,
                a.group_no,
                d.position AS day_position,
                gd.employee_dni AS staff_dni,
                p.first_name || ' ' || p.last_name AS staff_name
            FROM attendances a
            INNER JOIN group_days gd ON gd.group_no = a.group_no AND gd.day = a.day
            INNER JOIN days d ON d.name = a.day
            LEFT JOIN persons p ON p.dni = gd.employee_dni
            WHERE a.member_dni = ANY($1)
            "#,
        )
        .bind(member_dnis)
        .fetch_all(executor)
        .await?;

        Ok(assignments)
    }

    async fn lock_due<'e, E>(executor: E, due_id: i32) -> Result<Option<Due>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {DUE_COLUMNS} FROM dues WHERE id = $1 FOR UPDATE");
        let due = sqlx::query_as::<_, Due>(&sql)
            .bind(due_id)
            .fetch_optional(executor)
            .await?;

        Ok(due)
    }

    async fn exists<'e, E>(executor: E, sql: &str, key: &str) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let found = sqlx::query_scalar::<_, bool>(sql)
            .bind(key)
            .fetch_one(executor)
            .await?;

        Ok(found)
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    // =========================================================================
    //  GERAÇÃO MENSAL
    // =========================================================================

    async fn insert_monthly_dues(&self, period: &DuePeriod) -> Result<u64, AppError> {
        // Um único INSERT ... SELECT com anti-join: atômico e idempotente por (alumno, mes, año)
        let result = sqlx::query(
            r#"
            INSERT INTO dues (
                member_dni, paid, amount, period_start, period_end,
                period_label, period_year, job_name, plan_name
            )
            SELECT m.dni, FALSE, s.price, $1, $2, $3, $4, m.job_name, m.plan_name
            FROM active_members am
            INNER JOIN members m ON m.dni = am.dni
            INNER JOIN subscription_plans s ON s.name = m.plan_name
            WHERE NOT EXISTS (
                SELECT 1 FROM dues d
                WHERE d.member_dni = m.dni
                  AND d.period_label = $3
                  AND d.period_year = $4
            )
            ON CONFLICT (member_dni, period_label, period_year) DO NOTHING
            "#,
        )
        .bind(period.start)
        .bind(period.end)
        .bind(&period.label)
        .bind(period.year)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    //  CONSULTAS DE CUOTAS
    // =========================================================================

    async fn find_due(&self, due_id: i32) -> Result<Option<Due>, AppError> {
        let sql = format!("SELECT {DUE_COLUMNS} FROM dues WHERE id = $1");
        let due = sqlx::query_as::<_, Due>(&sql)
            .bind(due_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(due)
    }

    async fn dues_by_member(&self, dni: &str) -> Result<Vec<Due>, AppError> {
        let sql = format!(
            "SELECT {DUE_COLUMNS} FROM dues WHERE member_dni = $1 ORDER BY period_end DESC, id DESC"
        );
        let dues = sqlx::query_as::<_, Due>(&sql)
            .bind(dni)
            .fetch_all(&self.pool)
            .await?;

        Ok(dues)
    }

    // =========================================================================
    //  CONCILIAÇÃO
    // =========================================================================

    async fn settle_due(&self, due_id: i32, settlement: &Settlement) -> Result<SettleOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Trava a linha: duas notificações simultâneas não calculam recargo duas vezes
        let Some(due) = Self::lock_due(&mut *tx, due_id).await? else {
            return Ok(SettleOutcome::NotFound);
        };

        if due.paid {
            tx.commit().await?;
            return Ok(SettleOutcome::AlreadyPaid(due));
        }

        // 2. Recargo calculado uma única vez, sobre o valor e vencimento atuais
        let settled = due.settled(settlement);

        let sql = format!(
            r#"
            UPDATE dues
            SET paid = TRUE,
                amount = $2,
                payment_date = $3,
                payment_time = $4,
                payment_method = $5
            WHERE id = $1 AND paid = FALSE
            RETURNING {DUE_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Due>(&sql)
            .bind(due_id)
            .bind(settled.amount)
            .bind(settled.payment_date)
            .bind(settled.payment_time)
            .bind(settled.payment_method)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(match updated {
            Some(due) => SettleOutcome::Applied(due),
            None => SettleOutcome::AlreadyPaid(due),
        })
    }

    async fn member_contact(&self, dni: &str) -> Result<Option<MemberContact>, AppError> {
        let contact = sqlx::query_as::<_, MemberContact>(
            "SELECT dni, first_name, last_name, email FROM persons WHERE dni = $1",
        )
        .bind(dni)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contact)
    }

    async fn group_assignments(&self, dni: &str) -> Result<Vec<GroupAssignment>, AppError> {
        Self::fetch_assignments(&self.pool, &[dni.to_string()]).await
    }

    // =========================================================================
    //  FACTURACIÓN
    // =========================================================================

    async fn close_backlog(
        &self,
        period: &BillingPeriod,
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Todo o backlog digital ainda não facturado (o período é só informativo)
        let billable = sqlx::query_as::<_, BillableDue>(
            r#"
            SELECT id AS due_id, member_dni, amount
            FROM dues
            WHERE paid = TRUE
              AND invoiced = FALSE
              AND payment_method IN ('qr', 'transferencia')
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        if billable.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        // 2. Titular de cada alumno, resolvido pela mesma regra do pagamento
        let mut member_dnis: Vec<String> = billable.iter().map(|d| d.member_dni.clone()).collect();
        member_dnis.sort();
        member_dnis.dedup();

        let mut by_member: HashMap<String, Vec<GroupAssignment>> = HashMap::new();
        for assignment in Self::fetch_assignments(&mut *tx, &member_dnis).await? {
            by_member.entry(assignment.member_dni.clone()).or_default().push(assignment);
        }

        let drafts = group_by_titular(&billable, |dni| {
            resolve_titular(by_member.get(dni).map(Vec::as_slice).unwrap_or_default())
        });

        // 3. Uma factura por titular + marcação das cuotas na mesma transação
        let insert_sql = format!(
            r#"
            INSERT INTO invoices (period_start, period_end, generated_at, total_amount, due_count, titular, titular_dni)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INVOICE_COLUMNS}
            "#
        );

        let mut invoices = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let invoice = sqlx::query_as::<_, Invoice>(&insert_sql)
                .bind(period.start)
                .bind(period.end)
                .bind(generated_at)
                .bind(draft.total_amount)
                .bind(draft.due_count())
                .bind(draft.titular.label())
                .bind(draft.titular.staff_dni())
                .fetch_one(&mut *tx)
                .await?;

            let claimed = sqlx::query(
                r#"
                UPDATE dues
                SET invoiced = TRUE, invoice_id = $1
                WHERE id = ANY($2) AND invoiced = FALSE
                "#,
            )
            .bind(invoice.id)
            .bind(&draft.due_ids)
            .execute(&mut *tx)
            .await?;

            if claimed.rows_affected() != draft.due_ids.len() as u64 {
                // Rollback automático ao sair do escopo (drop do tx)
                return Err(AppError::BusinessRule(format!(
                    "Cuotas ya facturadas por otro cierre (titular {}).",
                    draft.titular.label()
                )));
            }

            invoices.push(invoice);
        }

        tx.commit().await?;
        Ok(invoices)
    }

    async fn invoice_report(&self, invoice_id: i32) -> Result<Option<InvoiceReport>, AppError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1");
        let Some(invoice) = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let details = sqlx::query_as::<_, InvoiceDetailRow>(
            r#"
            SELECT
                d.id AS due_id,
                d.member_dni,
                p.first_name || ' ' || p.last_name AS member_name,
                d.amount,
                d.payment_date,
                d.payment_method,
                d.period_label || ' - ' || d.plan_name AS concept
            FROM dues d
            INNER JOIN persons p ON p.dni = d.member_dni
            WHERE d.invoice_id = $1
            ORDER BY d.id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(InvoiceReport { invoice, details }))
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, AppError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY generated_at DESC, id DESC");
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    // =========================================================================
    //  ALUMNOS E EDIÇÃO ADMINISTRATIVA
    // =========================================================================

    async fn activate_member(
        &self,
        activation: &MemberActivation,
        first_period: &DuePeriod,
    ) -> Result<Due, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Persona existe e ainda não é alumno
        if !Self::exists(&mut *tx, "SELECT EXISTS(SELECT 1 FROM persons WHERE dni = $1)", &activation.dni).await? {
            return Err(AppError::NotFound(format!("Persona {}", activation.dni)));
        }
        if Self::exists(&mut *tx, "SELECT EXISTS(SELECT 1 FROM members WHERE dni = $1)", &activation.dni).await? {
            return Err(AppError::DuplicateEntry(format!("Alumno {}", activation.dni)));
        }

        // 2. Catálogos
        if !Self::exists(&mut *tx, "SELECT EXISTS(SELECT 1 FROM jobs WHERE name = $1)", &activation.job_name).await? {
            return Err(AppError::NotFound(format!("Trabajo {}", activation.job_name)));
        }
        let price = sqlx::query_scalar::<_, Decimal>("SELECT price FROM subscription_plans WHERE name = $1")
            .bind(&activation.plan_name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Suscripción {}", activation.plan_name)))?;

        // 3. Alumno + AlumnoActivo
        sqlx::query(
            r#"
            INSERT INTO members (dni, sex, job_name, plan_name, level, sport)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&activation.dni)
        .bind(&activation.sex)
        .bind(&activation.job_name)
        .bind(&activation.plan_name)
        .bind(&activation.level)
        .bind(&activation.sport)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::DuplicateEntry(format!("Alumno {}", activation.dni));
                }
            }
            AppError::DatabaseError(e)
        })?;

        sqlx::query("INSERT INTO active_members (dni) VALUES ($1)")
            .bind(&activation.dni)
            .execute(&mut *tx)
            .await?;

        // 4. Horários, respeitando a capacidade de cada grupo/dia
        for slot in &activation.schedules {
            let capacity = sqlx::query_scalar::<_, i32>(
                "SELECT capacity FROM group_days WHERE group_no = $1 AND day = $2 FOR UPDATE",
            )
            .bind(slot.group_no)
            .bind(&slot.day)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Horario grupo {} día {}", slot.group_no, slot.day)))?;

            let enrolled = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM attendances WHERE group_no = $1 AND day = $2",
            )
            .bind(slot.group_no)
            .bind(&slot.day)
            .fetch_one(&mut *tx)
            .await?;

            if enrolled >= i64::from(capacity) {
                return Err(AppError::BusinessRule(format!(
                    "El grupo {} del día {} está completo.",
                    slot.group_no, slot.day
                )));
            }

            sqlx::query("INSERT INTO attendances (member_dni, group_no, day) VALUES ($1, $2, $3)")
                .bind(&activation.dni)
                .bind(slot.group_no)
                .bind(&slot.day)
                .execute(&mut *tx)
                .await?;
        }

        // 5. Primeira cuota com o preço atual do plano
        let sql = format!(
            r#"
            INSERT INTO dues (
                member_dni, paid, amount, period_start, period_end,
                period_label, period_year, job_name, plan_name
            )
            VALUES ($1, FALSE, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {DUE_COLUMNS}
            "#
        );
        let due = sqlx::query_as::<_, Due>(&sql)
            .bind(&activation.dni)
            .bind(price)
            .bind(first_period.start)
            .bind(first_period.end)
            .bind(&first_period.label)
            .bind(first_period.year)
            .bind(&activation.job_name)
            .bind(&activation.plan_name)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(due)
    }

    async fn update_due(&self, due_id: i32, update: &DueUpdate, now: NaiveDateTime) -> Result<Due, AppError> {
        let mut tx = self.pool.begin().await?;

        let due = Self::lock_due(&mut *tx, due_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cuota {}", due_id)))?;

        let updated = update.apply_to(&due, now)?;

        let sql = format!(
            r#"
            UPDATE dues
            SET amount = $2,
                paid = $3,
                payment_date = $4,
                payment_time = $5,
                payment_method = $6
            WHERE id = $1 AND invoiced = FALSE
            RETURNING {DUE_COLUMNS}
            "#
        );
        let saved = sqlx::query_as::<_, Due>(&sql)
            .bind(due_id)
            .bind(updated.amount)
            .bind(updated.paid)
            .bind(updated.payment_date)
            .bind(updated.payment_time)
            .bind(updated.payment_method)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn delete_due(&self, due_id: i32) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let due = Self::lock_due(&mut *tx, due_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cuota {}", due_id)))?;

        if due.invoiced {
            return Err(AppError::BusinessRule(format!(
                "La cuota {} ya fue facturada y no puede eliminarse.",
                due_id
            )));
        }

        sqlx::query("DELETE FROM dues WHERE id = $1")
            .bind(due_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
