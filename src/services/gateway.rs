// src/services/gateway.rs

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    member::Titular,
    payments::{GatewayPayment, OwnerTag, PreferenceCreated, PreferenceRequest},
};

#[derive(Debug, Error)]
pub enum GatewayError {
    // Timeout, DNS, conexão recusada: o gateway reenvia a notificação depois
    #[error("gateway indisponível: {0}")]
    Unavailable(String),

    #[error("gateway recusou a requisição ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("resposta inválida do gateway: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) => true,
            GatewayError::Rejected { status, .. } => *status >= 500 || *status == 429,
            GatewayError::Decode(_) => false,
        }
    }
}

/// Operações do gateway de pagamentos usadas pelo conciliador.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(
        &self,
        owner: &OwnerTag,
        request: &PreferenceRequest,
    ) -> Result<PreferenceCreated, GatewayError>;

    /// Consulta o estado autoritativo de um pagamento com as credenciais do `owner`.
    async fn get_payment(&self, owner: &OwnerTag, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
}

// =============================================================================
//  CONTAS DE RECEBIMENTO
// =============================================================================

/// Access tokens por conta: administração + instrutores com conta própria.
#[derive(Debug, Clone, Default)]
pub struct MerchantAccounts {
    admin_token: String,
    staff_tokens: HashMap<String, String>,
}

impl MerchantAccounts {
    pub fn new(admin_token: impl Into<String>, staff_tokens: HashMap<String, String>) -> Self {
        Self { admin_token: admin_token.into(), staff_tokens }
    }

    /// Conta que recebe o dinheiro de uma cuota cujo titular já foi resolvido.
    /// Instrutor sem token configurado cai na conta da administração.
    pub fn route(&self, titular: &Titular) -> OwnerTag {
        match titular.staff_dni() {
            Some(dni) if self.staff_tokens.contains_key(dni) => OwnerTag::Staff(dni.to_string()),
            _ => OwnerTag::Admin,
        }
    }

    pub fn token_for(&self, owner: &OwnerTag) -> &str {
        match owner {
            OwnerTag::Staff(dni) => self
                .staff_tokens
                .get(dni)
                .map(String::as_str)
                .unwrap_or(&self.admin_token),
            OwnerTag::Admin => &self.admin_token,
        }
    }
}

/// Lê `dni=token;dni=token`. Entradas vazias são ignoradas.
pub fn parse_staff_tokens(raw: &str) -> Result<HashMap<String, String>, String> {
    let mut tokens = HashMap::new();

    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (dni, token) = entry
            .split_once('=')
            .ok_or_else(|| format!("entrada sem '=': '{}'", entry))?;

        match dni.trim().parse::<OwnerTag>() {
            Ok(OwnerTag::Staff(dni)) if !token.trim().is_empty() => {
                tokens.insert(dni, token.trim().to_string());
            }
            _ => return Err(format!("entrada inválida para o DNI '{}'", dni.trim())),
        }
    }

    Ok(tokens)
}

// =============================================================================
//  CLIENTE MERCADO PAGO
// =============================================================================

#[derive(Clone)]
pub struct MercadoPagoClient {
    client: Client,
    api_url: String,
    accounts: MerchantAccounts,
}

impl MercadoPagoClient {
    pub fn new(api_url: &str, accounts: MerchantAccounts, timeout: Duration) -> Result<Self, reqwest::Error> {
        // Sem retry aqui: o reenvio do webhook é o mecanismo de nova tentativa
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            accounts,
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }

        response.json::<T>().await.map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_preference(
        &self,
        owner: &OwnerTag,
        request: &PreferenceRequest,
    ) -> Result<PreferenceCreated, GatewayError> {
        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(self.accounts.token_for(owner))
            .header("X-Idempotency-Key", Uuid::new_v4().to_string())
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let created: PreferenceCreated = Self::read_json(response).await?;

        tracing::info!(
            preference_id = %created.id,
            owner = %owner,
            reference = %request.external_reference,
            "Preferência de pagamento criada"
        );

        Ok(created)
    }

    async fn get_payment(&self, owner: &OwnerTag, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", self.api_url, payment_id))
            .bearer_auth(self.accounts.token_for(owner))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> MerchantAccounts {
        let staff = parse_staff_tokens("20555444=APP_USR-ana; 20777666=APP_USR-diego;").unwrap();
        MerchantAccounts::new("APP_USR-admin", staff)
    }

    #[test]
    fn staff_tokens_are_parsed_from_env_format() {
        let tokens = parse_staff_tokens(" 20555444=tok-a ; 20777666=tok-b").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["20555444"], "tok-a");
        assert!(parse_staff_tokens("").unwrap().is_empty());
    }

    #[test]
    fn malformed_staff_tokens_are_rejected() {
        assert!(parse_staff_tokens("20555444").is_err());
        assert!(parse_staff_tokens("admin=tok").is_err());
        assert!(parse_staff_tokens("20555444=").is_err());
    }

    #[test]
    fn titular_with_account_routes_to_own_token() {
        let accounts = accounts();
        let ana = Titular::Staff { dni: "20555444".into(), full_name: "Ana Ruiz".into() };

        let owner = accounts.route(&ana);
        assert_eq!(owner, OwnerTag::Staff("20555444".into()));
        assert_eq!(accounts.token_for(&owner), "APP_USR-ana");
    }

    #[test]
    fn titular_without_account_falls_back_to_administration() {
        let accounts = accounts();
        let laura = Titular::Staff { dni: "20999888".into(), full_name: "Laura Gómez".into() };

        assert_eq!(accounts.route(&laura), OwnerTag::Admin);
        assert_eq!(accounts.route(&Titular::Administration), OwnerTag::Admin);
        // Tag antiga na URL de notificação de um instrutor que perdeu o token
        assert_eq!(accounts.token_for(&OwnerTag::Staff("20999888".into())), "APP_USR-admin");
    }

    #[test]
    fn only_transport_and_server_failures_are_retryable() {
        assert!(GatewayError::Unavailable("timeout".into()).is_retryable());
        assert!(GatewayError::Rejected { status: 503, body: String::new() }.is_retryable());
        assert!(!GatewayError::Rejected { status: 400, body: "bad".into() }.is_retryable());
        assert!(!GatewayError::Decode("eof".into()).is_retryable());
    }
}
