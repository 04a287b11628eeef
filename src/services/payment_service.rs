// src/services/payment_service.rs

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::{
    common::error::AppError,
    db::SharedLedger,
    models::{
        dues::{Due, PaymentMethod, SettleOutcome, Settlement},
        member::MemberContact,
        payments::{
            BackUrls, OwnerTag, PaymentNotification, PaymentPreference, PreferenceItem, PreferencePayer,
            PreferenceRequest, ReconcileOutcome,
        },
    },
    services::gateway::{MerchantAccounts, PaymentGateway},
};

/// URLs e moeda usadas para montar a preferência de pagamento.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub frontend_url: String,
    pub backend_url: String,
    pub currency: String,
}

impl CheckoutConfig {
    /// O gateway devolve o navegador ao backend, que repassa ao frontend (`/api/pagos/retorno`).
    pub fn back_urls(&self) -> BackUrls {
        let bridge = format!("{}/api/pagos/retorno", self.backend_url.trim_end_matches('/'));
        BackUrls {
            success: bridge.clone(),
            failure: bridge.clone(),
            pending: bridge,
        }
    }

    pub fn return_redirect(&self, query: Option<&str>) -> String {
        let target = format!("{}/Usuario", self.frontend_url.trim_end_matches('/'));
        match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{}?{}", target, q),
            None => target,
        }
    }

    /// O `owner` volta no webhook e decide com quais credenciais consultar o pagamento.
    pub fn notification_url(&self, owner: &OwnerTag) -> String {
        format!("{}/api/pagos/webhook?owner={}", self.backend_url.trim_end_matches('/'), owner)
    }
}

/// Monta o pedido de preferência: um item com o valor final e a cuota como referência externa.
pub fn build_preference_request(
    due: &Due,
    payer: &MemberContact,
    amount: Decimal,
    owner: &OwnerTag,
    checkout: &CheckoutConfig,
) -> PreferenceRequest {
    PreferenceRequest {
        items: vec![PreferenceItem {
            id: due.id.to_string(),
            title: format!("Cuota {} {} - {}", due.period_label, due.period_year, due.plan_name),
            quantity: 1,
            unit_price: amount,
            currency_id: checkout.currency.clone(),
        }],
        payer: PreferencePayer {
            name: payer.first_name.clone(),
            surname: payer.last_name.clone(),
            email: payer.email.clone(),
        },
        external_reference: due.id.to_string(),
        back_urls: checkout.back_urls(),
        auto_return: "approved".to_string(),
        notification_url: checkout.notification_url(owner),
    }
}

/// Conciliador de pagamentos digitais.
#[derive(Clone)]
pub struct PaymentService {
    store: SharedLedger,
    gateway: Arc<dyn PaymentGateway>,
    accounts: MerchantAccounts,
    checkout: CheckoutConfig,
}

impl PaymentService {
    pub fn new(
        store: SharedLedger,
        gateway: Arc<dyn PaymentGateway>,
        accounts: MerchantAccounts,
        checkout: CheckoutConfig,
    ) -> Self {
        Self { store, gateway, accounts, checkout }
    }

    // =========================================================================
    //  PREFERÊNCIA DE PAGAMENTO
    // =========================================================================

    pub async fn create_payment_preference(
        &self,
        due_id: i32,
        proposed_amount: Option<Decimal>,
    ) -> Result<PaymentPreference, AppError> {
        self.create_payment_preference_on(due_id, proposed_amount, Local::now().date_naive())
            .await
    }

    pub async fn create_payment_preference_on(
        &self,
        due_id: i32,
        proposed_amount: Option<Decimal>,
        today: NaiveDate,
    ) -> Result<PaymentPreference, AppError> {
        let due = self
            .store
            .find_due(due_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cuota {}", due_id)))?;

        if due.paid {
            return Err(AppError::BusinessRule(format!("La cuota {} ya está pagada.", due_id)));
        }

        // O valor cobrado é sempre o do servidor (com recargo, se vencida)
        let amount = due.amount_due_on(today);
        if let Some(proposed) = proposed_amount {
            if proposed != amount {
                tracing::warn!(due_id, %proposed, %amount, "Valor proposto difere do calculado; usando o do servidor");
            }
        }

        let payer = self
            .store
            .member_contact(&due.member_dni)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Persona {}", due.member_dni)))?;

        let titular = self.store.titular_for_member(&due.member_dni).await?;
        let owner = self.accounts.route(&titular);

        let request = build_preference_request(&due, &payer, amount, &owner, &self.checkout);

        let created = self
            .gateway
            .create_preference(&owner, &request)
            .await
            .map_err(|e| {
                tracing::error!(due_id, owner = %owner, "❌ Falha ao criar preferência: {}", e);
                AppError::PaymentInitiation
            })?;

        Ok(PaymentPreference {
            preference_id: created.id,
            checkout_url: created.init_point,
            sandbox_checkout_url: created.sandbox_init_point,
            amount,
        })
    }

    // =========================================================================
    //  CONCILIAÇÃO (webhook)
    // =========================================================================

    pub async fn reconcile_payment(
        &self,
        owner: &OwnerTag,
        payment_id: &str,
        reported_amount: Option<Decimal>,
    ) -> Result<ReconcileOutcome, AppError> {
        self.reconcile_payment_at(owner, payment_id, reported_amount, Local::now().naive_local())
            .await
    }

    pub async fn reconcile_payment_at(
        &self,
        owner: &OwnerTag,
        payment_id: &str,
        reported_amount: Option<Decimal>,
        now: NaiveDateTime,
    ) -> Result<ReconcileOutcome, AppError> {
        // 1. Estado autoritativo vem do gateway, nunca da notificação
        let payment = self.gateway.get_payment(owner, payment_id).await?;

        if !payment.is_approved() {
            return Ok(ReconcileOutcome::NotApproved { status: payment.status });
        }

        let Some(due_id) = payment.due_id() else {
            return Ok(ReconcileOutcome::MissingReference);
        };

        let Some(due) = self.store.find_due(due_id).await? else {
            return Ok(ReconcileOutcome::DueNotFound { due_id });
        };

        if due.paid {
            return Ok(ReconcileOutcome::AlreadyPaid { due_id });
        }

        // 2. Pagamento aprovado quita a cuota; a preferência pode ter sido emitida antes do vencimento
        if let (Some(reported), Some(received)) = (reported_amount, payment.transaction_amount) {
            if reported != received {
                tracing::warn!(payment_id, %reported, %received, "Valor informado difere do gateway; usando o do gateway");
            }
        }
        if let Some(received) = payment.transaction_amount {
            let expected = due.amount_due_on(now.date());
            if received < expected {
                tracing::warn!(payment_id, due_id, %expected, %received, "⚠️ Valor recebido abaixo do devido hoje; quitando mesmo assim");
            }
        }

        // 3. Transição protegida: recargo aplicado uma única vez
        let settlement = Settlement { method: PaymentMethod::Qr, paid_at: now };
        Ok(match self.store.settle_due(due_id, &settlement).await? {
            SettleOutcome::Applied(due) => ReconcileOutcome::Applied { due_id, amount: due.amount },
            SettleOutcome::AlreadyPaid(_) => ReconcileOutcome::AlreadyPaid { due_id },
            SettleOutcome::NotFound => ReconcileOutcome::DueNotFound { due_id },
        })
    }

    /// Processa a notificação do gateway. Nunca falha: o webhook sempre responde 200.
    pub async fn handle_notification(&self, notification: &PaymentNotification) {
        self.handle_notification_at(notification, Local::now().naive_local()).await
    }

    pub async fn handle_notification_at(&self, notification: &PaymentNotification, now: NaiveDateTime) {
        let Some(payment_id) = notification.payment_id.as_deref().filter(|_| notification.is_payment()) else {
            tracing::debug!(topic = ?notification.topic, "Notificação ignorada (não é de pagamento)");
            return;
        };

        match self.reconcile_payment_at(&notification.owner, payment_id, None, now).await {
            Ok(ReconcileOutcome::Applied { due_id, amount }) => {
                tracing::info!(payment_id, due_id, %amount, "✅ Cuota paga via gateway");
            }
            Ok(ReconcileOutcome::AlreadyPaid { due_id }) => {
                tracing::info!(payment_id, due_id, "ℹ️ Notificação repetida: cuota já estava paga");
            }
            Ok(ReconcileOutcome::NotApproved { status }) => {
                tracing::info!(payment_id, %status, "Pagamento ainda não aprovado");
            }
            Ok(ReconcileOutcome::MissingReference) => {
                tracing::warn!(payment_id, "⚠️ Pagamento aprovado sem external_reference");
            }
            Ok(ReconcileOutcome::DueNotFound { due_id }) => {
                tracing::error!(payment_id, due_id, "⚠️ Pagamento aprovado para cuota inexistente");
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(payment_id, owner = %notification.owner, "Gateway indisponível, aguardando reenvio: {}", e);
            }
            Err(e) => {
                tracing::error!(payment_id, owner = %notification.owner, "❌ Erro ao conciliar pagamento: {}", e);
            }
        }
    }
}
