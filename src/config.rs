// src/config.rs

use std::{collections::HashMap, env, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{LedgerRepository, SharedLedger},
    services::{
        gateway::{parse_staff_tokens, MercadoPagoClient, MerchantAccounts, PaymentGateway},
        BillingService, CheckoutConfig, DocumentService, DuesService, PaymentService,
    },
};

pub const DEFAULT_MP_API_URL: &str = "https://api.mercadopago.com";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub mp_access_token: String,
    pub mp_staff_tokens: HashMap<String, String>,
    pub mp_api_url: String,
    pub mp_currency: String,
    pub gateway_timeout: Duration,
    pub frontend_url: String,
    pub backend_url: String,
    pub server_addr: String,
    pub dues_generation_day: u32,
    pub scheduler_enabled: bool,
    pub db_max_connections: u32,
    pub pdf_fonts_dir: String,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Lê as variáveis a partir de qualquer fonte (env real ou mapa nos testes).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} deve ser definida", key))
        };
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mp_staff_tokens = parse_staff_tokens(&optional("MP_STAFF_ACCESS_TOKENS", ""))
            .map_err(|e| anyhow!("MP_STAFF_ACCESS_TOKENS inválida: {}", e))?;

        let gateway_timeout_secs: u64 = optional("GATEWAY_TIMEOUT_SECS", "10")
            .parse()
            .context("GATEWAY_TIMEOUT_SECS deve ser um número de segundos")?;

        let dues_generation_day: u32 = optional("DUES_GENERATION_DAY", "1")
            .parse()
            .context("DUES_GENERATION_DAY deve ser numérico")?;
        if !(1..=28).contains(&dues_generation_day) {
            return Err(anyhow!("DUES_GENERATION_DAY deve estar entre 1 e 28"));
        }

        let scheduler_enabled = !matches!(
            optional("SCHEDULER_ENABLED", "true").to_lowercase().as_str(),
            "false" | "0" | "no"
        );

        let db_max_connections: u32 = optional("DB_MAX_CONNECTIONS", "5")
            .parse()
            .context("DB_MAX_CONNECTIONS deve ser numérico")?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            mp_access_token: required("MP_ACCESS_TOKEN")?,
            mp_staff_tokens,
            mp_api_url: optional("MP_API_URL", DEFAULT_MP_API_URL),
            mp_currency: optional("MP_CURRENCY", "ARS"),
            gateway_timeout: Duration::from_secs(gateway_timeout_secs),
            frontend_url: required("FRONTEND_URL")?,
            backend_url: required("BACKEND_URL")?,
            server_addr: optional("SERVER_ADDR", "0.0.0.0:3000"),
            dues_generation_day,
            scheduler_enabled,
            db_max_connections,
            pdf_fonts_dir: optional("PDF_FONTS_DIR", "./fonts"),
        })
    }

    pub fn merchant_accounts(&self) -> MerchantAccounts {
        MerchantAccounts::new(self.mp_access_token.clone(), self.mp_staff_tokens.clone())
    }

    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig {
            frontend_url: self.frontend_url.clone(),
            backend_url: self.backend_url.clone(),
            currency: self.mp_currency.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Arc<Settings>,
    pub dues_service: DuesService,
    pub payment_service: PaymentService,
    pub billing_service: BillingService,
    pub document_service: DocumentService,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let store: SharedLedger = Arc::new(LedgerRepository::new(db_pool.clone()));
        let gateway = MercadoPagoClient::new(
            &settings.mp_api_url,
            settings.merchant_accounts(),
            settings.gateway_timeout,
        )
        .context("Falha ao criar o cliente do Mercado Pago")?;

        Ok(Self::from_parts(db_pool, settings, store, Arc::new(gateway)))
    }

    // --- Monta o gráfico de dependências ---
    pub fn from_parts(
        db_pool: PgPool,
        settings: Settings,
        store: SharedLedger,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let dues_service = DuesService::new(store.clone());
        let payment_service = PaymentService::new(
            store.clone(),
            gateway,
            settings.merchant_accounts(),
            settings.checkout(),
        );
        let billing_service = BillingService::new(store);
        let document_service = DocumentService::new(settings.pdf_fonts_dir.clone());

        Self {
            db_pool,
            settings: Arc::new(settings),
            dues_service,
            payment_service,
            billing_service,
            document_service,
        }
    }
}
