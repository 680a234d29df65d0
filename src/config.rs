// src/config.rs

use std::{env, fmt::Display, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    db::{BillingStore, PgBillingStore},
    services::{
        allocation_service::AllocationService, deletion_service::DeletionService,
        ledger_service::LedgerService, schedule_service::ScheduleService,
        status_service::StatusService,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub app_addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL deve ser definida")?;

        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?;
        let acquire_timeout_secs = parse_or(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS", 3u64)?;
        let app_addr = parse_or(&lookup, "APP_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            app_addr,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    T: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} inválida: '{}' (padrão {})", key, raw, default)),
        None => Ok(default),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub allocation_service: AllocationService,
    pub schedule_service: ScheduleService,
    pub status_service: StatusService,
    pub deletion_service: DeletionService,
    pub ledger_service: LedgerService,
}

impl AppState {
    /// Conecta ao Postgres, aplica as migrações e monta os serviços.
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(&settings.database_url)
            .await
            .context("Falha ao conectar no banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        sqlx::migrate!()
            .run(&db_pool)
            .await
            .context("Falha ao rodar as migrações do banco de dados")?;

        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

        Ok(Self::with_store(Arc::new(PgBillingStore::new(db_pool))))
    }

    // --- Monta o gráfico de dependências ---
    pub fn with_store(store: Arc<dyn BillingStore>) -> Self {
        Self {
            allocation_service: AllocationService::new(store.clone()),
            schedule_service: ScheduleService::new(store.clone()),
            status_service: StatusService::new(store.clone()),
            deletion_service: DeletionService::new(store.clone()),
            ledger_service: LedgerService::new(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_url_is_set() {
        let settings = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/billing")])).unwrap();

        assert_eq!(settings.max_connections, 5);
        assert_eq!(settings.acquire_timeout, Duration::from_secs(3));
        assert_eq!(settings.app_addr, "0.0.0.0:3000".parse().unwrap());
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("DATABASE_ACQUIRE_TIMEOUT_SECS", "10"),
            ("APP_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();

        assert_eq!(settings.max_connections, 12);
        assert_eq!(settings.acquire_timeout, Duration::from_secs(10));
        assert_eq!(settings.app_addr.port(), 8080);
    }

    #[test]
    fn missing_url_or_bad_numbers_fail() {
        assert!(Settings::from_lookup(lookup(&[])).is_err());

        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("DATABASE_MAX_CONNECTIONS", "muitas"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));
    }
}
