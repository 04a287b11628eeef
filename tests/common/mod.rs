#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;

use gym_billing::common::error::AppError;
use gym_billing::db::{LedgerStore, SharedLedger};
use gym_billing::models::billing::{
    concept, group_by_titular, BillableDue, BillingPeriod, Invoice, InvoiceDetailRow, InvoiceReport,
};
use gym_billing::models::dues::{Due, DuePeriod, DueUpdate, PaymentMethod, SettleOutcome, Settlement};
use gym_billing::models::member::{
    resolve_titular, GroupAssignment, MemberActivation, MemberContact, ScheduleSlot,
};
use gym_billing::models::payments::{GatewayPayment, OwnerTag, PreferenceCreated, PreferenceRequest};
use gym_billing::services::gateway::{GatewayError, MerchantAccounts, PaymentGateway};
use gym_billing::services::{BillingService, CheckoutConfig, DuesService, PaymentService};

pub const STAFF_WITH_ACCOUNT: &str = "20555444";
pub const STAFF_WITHOUT_ACCOUNT: &str = "20999888";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(day: NaiveDate, h: u32, min: u32) -> NaiveDateTime {
    day.and_hms_opt(h, min, 0).unwrap()
}

pub fn money(units: i64, cents: u32) -> Decimal {
    Decimal::new(units * 100 + cents as i64, 2)
}

const WEEK: [&str; 7] = ["Lunes", "Martes", "Miércoles", "Jueves", "Viernes", "Sábado", "Domingo"];

fn day_position(day: &str) -> i16 {
    WEEK.iter().position(|d| *d == day).map(|p| p as i16 + 1).unwrap_or(99)
}

// =============================================================================
//  LEDGER EM MEMÓRIA
// =============================================================================

#[derive(Default)]
struct State {
    persons: HashMap<String, MemberContact>,
    jobs: HashSet<String>,
    plans: HashMap<String, Decimal>,
    members: HashMap<String, (String, String)>,
    active: BTreeSet<String>,
    group_days: HashMap<(i32, String), (i32, Option<String>)>,
    attendances: Vec<(String, i32, String)>,
    dues: BTreeMap<i32, Due>,
    invoices: Vec<Invoice>,
    next_due_id: i32,
    next_invoice_id: i32,
}

/// Mesmo contrato do repositório Postgres, com as mesmas regras puras de `models`.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
    failing: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shared(self: &Arc<Self>) -> SharedLedger {
        self.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    // --- Fixtures ---

    pub fn add_person(&self, dni: &str, first_name: &str, last_name: &str) {
        self.state.lock().unwrap().persons.insert(
            dni.to_string(),
            MemberContact {
                dni: dni.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: Some(format!("{}@example.com", dni)),
            },
        );
    }

    pub fn add_job(&self, name: &str) {
        self.state.lock().unwrap().jobs.insert(name.to_string());
    }

    pub fn set_plan_price(&self, plan: &str, price: Decimal) {
        self.state.lock().unwrap().plans.insert(plan.to_string(), price);
    }

    pub fn add_group_day(&self, group_no: i32, day: &str, capacity: i32, staff_dni: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .group_days
            .insert((group_no, day.to_string()), (capacity, staff_dni.map(str::to_string)));
    }

    /// Alumno ativo sem cuota (como se a primeira já tivesse sido gerada em outro ciclo).
    pub fn enroll(&self, dni: &str, job: &str, plan: &str, schedules: &[(i32, &str)]) {
        let mut state = self.state.lock().unwrap();
        state.members.insert(dni.to_string(), (job.to_string(), plan.to_string()));
        state.active.insert(dni.to_string());
        for (group_no, day) in schedules {
            state.attendances.push((dni.to_string(), *group_no, day.to_string()));
        }
    }

    pub fn deactivate(&self, dni: &str) {
        self.state.lock().unwrap().active.remove(dni);
    }

    pub fn insert_due(&self, member_dni: &str, amount: Decimal, period_end: NaiveDate) -> i32 {
        let mut state = self.state.lock().unwrap();
        state.next_due_id += 1;
        let id = state.next_due_id;
        let (job_name, plan_name) = state
            .members
            .get(member_dni)
            .cloned()
            .unwrap_or_else(|| ("Musculación".to_string(), "3 días".to_string()));
        let start = period_end - Days::new(30);
        let period = DuePeriod::starting(start);

        state.dues.insert(
            id,
            Due {
                id,
                member_dni: member_dni.to_string(),
                paid: false,
                amount,
                period_start: start,
                period_end,
                period_label: period.label,
                period_year: period.year,
                job_name,
                plan_name,
                payment_date: None,
                payment_time: None,
                payment_method: None,
                invoiced: false,
                invoice_id: None,
            },
        );
        id
    }

    pub fn insert_paid_due(&self, member_dni: &str, amount: Decimal, method: PaymentMethod, paid_on: NaiveDate) -> i32 {
        let id = self.insert_due(member_dni, amount, paid_on + Days::new(10));
        let mut state = self.state.lock().unwrap();
        let due = state.dues.get_mut(&id).unwrap();
        *due = due.settled(&Settlement { method, paid_at: at(paid_on, 10, 0) });
        id
    }

    pub fn due(&self, id: i32) -> Due {
        self.state.lock().unwrap().dues[&id].clone()
    }

    pub fn all_dues(&self) -> Vec<Due> {
        self.state.lock().unwrap().dues.values().cloned().collect()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.state.lock().unwrap().invoices.clone()
    }

    fn assignments(state: &State, dni: &str) -> Vec<GroupAssignment> {
        state
            .attendances
            .iter()
            .filter(|(member, _, _)| member == dni)
            .map(|(member, group_no, day)| {
                let staff_dni = state
                    .group_days
                    .get(&(*group_no, day.clone()))
                    .and_then(|(_, staff)| staff.clone());
                let staff_name = staff_dni
                    .as_ref()
                    .and_then(|s| state.persons.get(s))
                    .map(MemberContact::full_name);
                GroupAssignment {
                    member_dni: member.clone(),
                    group_no: *group_no,
                    day_position: day_position(day),
                    staff_dni,
                    staff_name,
                }
            })
            .collect()
    }

    fn new_due(state: &mut State, dni: &str, job: &str, plan: &str, price: Decimal, period: &DuePeriod) -> Due {
        state.next_due_id += 1;
        let due = Due {
            id: state.next_due_id,
            member_dni: dni.to_string(),
            paid: false,
            amount: price,
            period_start: period.start,
            period_end: period.end,
            period_label: period.label.clone(),
            period_year: period.year,
            job_name: job.to_string(),
            plan_name: plan.to_string(),
            payment_date: None,
            payment_time: None,
            payment_method: None,
            invoiced: false,
            invoice_id: None,
        };
        state.dues.insert(due.id, due.clone());
        due
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_monthly_dues(&self, period: &DuePeriod) -> Result<u64, AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let mut created = 0;

        let active: Vec<String> = state.active.iter().cloned().collect();
        for dni in active {
            let Some((job, plan)) = state.members.get(&dni).cloned() else { continue };
            let Some(price) = state.plans.get(&plan).copied() else { continue };
            let covered = state
                .dues
                .values()
                .any(|d| d.member_dni == dni && d.period_label == period.label && d.period_year == period.year);
            if covered {
                continue;
            }
            Self::new_due(&mut state, &dni, &job, &plan, price, period);
            created += 1;
        }

        Ok(created)
    }

    async fn find_due(&self, due_id: i32) -> Result<Option<Due>, AppError> {
        self.check()?;
        Ok(self.state.lock().unwrap().dues.get(&due_id).cloned())
    }

    async fn dues_by_member(&self, dni: &str) -> Result<Vec<Due>, AppError> {
        self.check()?;
        let mut dues: Vec<Due> = self
            .state
            .lock()
            .unwrap()
            .dues
            .values()
            .filter(|d| d.member_dni == dni)
            .cloned()
            .collect();
        dues.sort_by(|a, b| b.period_end.cmp(&a.period_end).then(b.id.cmp(&a.id)));
        Ok(dues)
    }

    async fn settle_due(&self, due_id: i32, settlement: &Settlement) -> Result<SettleOutcome, AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let Some(due) = state.dues.get_mut(&due_id) else {
            return Ok(SettleOutcome::NotFound);
        };
        if due.paid {
            return Ok(SettleOutcome::AlreadyPaid(due.clone()));
        }
        *due = due.settled(settlement);
        Ok(SettleOutcome::Applied(due.clone()))
    }

    async fn member_contact(&self, dni: &str) -> Result<Option<MemberContact>, AppError> {
        self.check()?;
        Ok(self.state.lock().unwrap().persons.get(dni).cloned())
    }

    async fn group_assignments(&self, dni: &str) -> Result<Vec<GroupAssignment>, AppError> {
        self.check()?;
        Ok(Self::assignments(&self.state.lock().unwrap(), dni))
    }

    async fn close_backlog(&self, period: &BillingPeriod, generated_at: DateTime<Utc>) -> Result<Vec<Invoice>, AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();

        let billable: Vec<BillableDue> = state
            .dues
            .values()
            .filter(|d| d.paid && !d.invoiced && d.payment_method.is_some_and(PaymentMethod::is_digital))
            .map(|d| BillableDue { due_id: d.id, member_dni: d.member_dni.clone(), amount: d.amount })
            .collect();

        let drafts = group_by_titular(&billable, |dni| resolve_titular(&Self::assignments(&state, dni)));

        let mut invoices = Vec::new();
        for draft in drafts {
            state.next_invoice_id += 1;
            let invoice = Invoice {
                id: state.next_invoice_id,
                period_start: period.start,
                period_end: period.end,
                generated_at,
                total_amount: draft.total_amount,
                due_count: draft.due_count(),
                titular: draft.titular.label().to_string(),
                titular_dni: draft.titular.staff_dni().map(str::to_string),
            };
            for id in &draft.due_ids {
                let due = state.dues.get_mut(id).unwrap();
                due.invoiced = true;
                due.invoice_id = Some(invoice.id);
            }
            state.invoices.push(invoice.clone());
            invoices.push(invoice);
        }

        Ok(invoices)
    }

    async fn invoice_report(&self, invoice_id: i32) -> Result<Option<InvoiceReport>, AppError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let Some(invoice) = state.invoices.iter().find(|i| i.id == invoice_id).cloned() else {
            return Ok(None);
        };

        let details = state
            .dues
            .values()
            .filter(|d| d.invoice_id == Some(invoice_id))
            .map(|d| InvoiceDetailRow {
                due_id: d.id,
                member_dni: d.member_dni.clone(),
                member_name: state.persons.get(&d.member_dni).map(MemberContact::full_name).unwrap_or_default(),
                amount: d.amount,
                payment_date: d.payment_date,
                payment_method: d.payment_method,
                concept: concept(&d.period_label, &d.plan_name),
            })
            .collect();

        Ok(Some(InvoiceReport { invoice, details }))
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, AppError> {
        self.check()?;
        let mut invoices = self.state.lock().unwrap().invoices.clone();
        invoices.sort_by(|a, b| b.generated_at.cmp(&a.generated_at).then(b.id.cmp(&a.id)));
        Ok(invoices)
    }

    async fn activate_member(&self, activation: &MemberActivation, first_period: &DuePeriod) -> Result<Due, AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let dni = activation.dni.as_str();

        if !state.persons.contains_key(dni) {
            return Err(AppError::NotFound(format!("Persona {}", dni)));
        }
        if state.members.contains_key(dni) {
            return Err(AppError::DuplicateEntry(format!("Alumno {}", dni)));
        }
        if !state.jobs.contains(&activation.job_name) {
            return Err(AppError::NotFound(format!("Trabajo {}", activation.job_name)));
        }
        let price = *state
            .plans
            .get(&activation.plan_name)
            .ok_or_else(|| AppError::NotFound(format!("Suscripción {}", activation.plan_name)))?;

        for ScheduleSlot { group_no, day } in &activation.schedules {
            let (capacity, _) = state
                .group_days
                .get(&(*group_no, day.clone()))
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Horario grupo {} día {}", group_no, day)))?;
            let enrolled = state
                .attendances
                .iter()
                .filter(|(_, g, d)| g == group_no && d == day)
                .count() as i32;
            if enrolled >= capacity {
                return Err(AppError::BusinessRule(format!("El grupo {} del día {} está completo.", group_no, day)));
            }
        }

        state
            .members
            .insert(dni.to_string(), (activation.job_name.clone(), activation.plan_name.clone()));
        state.active.insert(dni.to_string());
        for slot in &activation.schedules {
            state.attendances.push((dni.to_string(), slot.group_no, slot.day.clone()));
        }

        Ok(Self::new_due(&mut state, dni, &activation.job_name, &activation.plan_name, price, first_period))
    }

    async fn update_due(&self, due_id: i32, update: &DueUpdate, now: NaiveDateTime) -> Result<Due, AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let due = state
            .dues
            .get_mut(&due_id)
            .ok_or_else(|| AppError::NotFound(format!("Cuota {}", due_id)))?;
        *due = update.apply_to(due, now)?;
        Ok(due.clone())
    }

    async fn delete_due(&self, due_id: i32) -> Result<(), AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        match state.dues.get(&due_id) {
            None => Err(AppError::NotFound(format!("Cuota {}", due_id))),
            Some(due) if due.invoiced => Err(AppError::BusinessRule(format!(
                "La cuota {} ya fue facturada y no puede eliminarse.",
                due_id
            ))),
            Some(_) => {
                state.dues.remove(&due_id);
                Ok(())
            }
        }
    }
}

// =============================================================================
//  GATEWAY FALSO
// =============================================================================

#[derive(Default)]
pub struct FakeGateway {
    payments: Mutex<HashMap<String, GatewayPayment>>,
    pub preferences: Mutex<Vec<(OwnerTag, PreferenceRequest)>>,
    pub lookups: Mutex<Vec<(OwnerTag, String)>>,
    unavailable: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn add_payment(&self, payment_id: i64, status: &str, due_id: Option<i32>, amount: Option<Decimal>) {
        self.payments.lock().unwrap().insert(
            payment_id.to_string(),
            GatewayPayment {
                id: payment_id,
                status: status.to_string(),
                transaction_amount: amount,
                external_reference: due_id.map(|id| id.to_string()),
            },
        );
    }

    pub fn approve(&self, payment_id: i64, due_id: i32, amount: Decimal) {
        self.add_payment(payment_id, "approved", Some(due_id), Some(amount));
    }

    pub fn last_preference(&self) -> (OwnerTag, PreferenceRequest) {
        self.preferences.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_preference(&self, owner: &OwnerTag, request: &PreferenceRequest) -> Result<PreferenceCreated, GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("connection refused".into()));
        }
        self.preferences.lock().unwrap().push((owner.clone(), request.clone()));
        Ok(PreferenceCreated {
            id: format!("pref-{}", request.external_reference),
            init_point: format!("https://mp.test/checkout/{}", request.external_reference),
            sandbox_init_point: Some(format!("https://sandbox.mp.test/checkout/{}", request.external_reference)),
        })
    }

    async fn get_payment(&self, owner: &OwnerTag, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("timeout".into()));
        }
        self.lookups.lock().unwrap().push((owner.clone(), payment_id.to_string()));
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected { status: 404, body: "not_found".into() })
    }
}

// =============================================================================
//  MONTAGEM
// =============================================================================

pub fn merchant_accounts() -> MerchantAccounts {
    let mut staff = HashMap::new();
    staff.insert(STAFF_WITH_ACCOUNT.to_string(), "APP_USR-ana".to_string());
    MerchantAccounts::new("APP_USR-admin", staff)
}

pub fn checkout() -> CheckoutConfig {
    CheckoutConfig {
        frontend_url: "http://localhost:8080".into(),
        backend_url: "https://api.gym.test".into(),
        currency: "ARS".into(),
    }
}

pub struct Harness {
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<FakeGateway>,
    pub dues: DuesService,
    pub payments: PaymentService,
    pub billing: BillingService,
}

impl Harness {
    /// Academia com dois instrutores, um plano e alguns grupos.
    pub fn new() -> Self {
        let ledger = MemoryLedger::new();
        let gateway = FakeGateway::new();

        ledger.add_person(STAFF_WITH_ACCOUNT, "Ana", "Ruiz");
        ledger.add_person(STAFF_WITHOUT_ACCOUNT, "Laura", "Gómez");
        ledger.add_job("Musculación");
        ledger.set_plan_price("3 días", Decimal::new(20000, 0));
        ledger.add_group_day(1, "Lunes", 10, Some(STAFF_WITH_ACCOUNT));
        ledger.add_group_day(1, "Miércoles", 10, Some(STAFF_WITH_ACCOUNT));
        ledger.add_group_day(2, "Martes", 2, Some(STAFF_WITHOUT_ACCOUNT));
        ledger.add_group_day(3, "Jueves", 10, None);

        let dues = DuesService::new(ledger.shared());
        let payments = PaymentService::new(ledger.shared(), gateway.clone(), merchant_accounts(), checkout());
        let billing = BillingService::new(ledger.shared());

        Self { ledger, gateway, dues, payments, billing }
    }

    /// Pessoa + alumno ativo nos horários informados.
    pub fn member(&self, dni: &str, name: &str, schedules: &[(i32, &str)]) {
        let (first, last) = name.split_once(' ').unwrap_or((name, ""));
        self.ledger.add_person(dni, first, last);
        self.ledger.enroll(dni, "Musculación", "3 días", schedules);
    }
}
