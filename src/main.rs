//src/main.rs

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use gym_billing::{
    config::{AppState, Settings},
    scheduler::start_scheduler,
    startup::build_router,
};

#[tokio::main]
async fn main() {
    // Inicializa o logger (RUST_LOG sobrescreve o nível padrão)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let settings = Settings::from_env().expect("Configuração inválida.");
    let app_state = AppState::new(settings)
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // O handle precisa viver enquanto o servidor estiver no ar
    let _scheduler = if app_state.settings.scheduler_enabled {
        Some(
            start_scheduler(
                app_state.dues_service.clone(),
                app_state.billing_service.clone(),
                app_state.settings.dues_generation_day,
            )
            .await
            .expect("Falha ao iniciar o agendador."),
        )
    } else {
        tracing::warn!("Agendador desativado (SCHEDULER_ENABLED=false)");
        None
    };

    let addr = app_state.settings.server_addr.clone();
    let app = build_router(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", addr);
    axum::serve(listener, app)
        .await
        .expect("Erro no servidor Axum");
}
