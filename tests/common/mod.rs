#![allow(dead_code)]

use std::{env, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tower::ServiceExt;

use billing_backend::{
    build_router,
    db::{BillingStore, MemoryBillingStore},
    models::billing::{PaymentCadence, TenantStatus},
    AppState,
};

/// Router completo sobre o armazenamento em memória, com um contrato pré-pago já montado.
pub struct MemoryApp {
    pub memory: MemoryBillingStore,
    pub landlord_id: i64,
    pub tenant_id: i64,
    pub building_id: i64,
    pub contract_id: i64,
}

impl MemoryApp {
    pub async fn new() -> Self {
        let memory = MemoryBillingStore::new();
        let landlord_id = memory.add_user("Sr. Park", TenantStatus::Active).await;
        let tenant_id = memory.add_user("Kim", TenantStatus::Active).await;
        let building_id = memory.add_building(landlord_id, "Edifício Aurora").await;
        let contract_id = memory
            .add_contract(
                tenant_id,
                building_id,
                PaymentCadence::Prepaid,
                NaiveDate::from_ymd_opt(2023, 11, 10).unwrap(),
                Some("301"),
            )
            .await;

        Self { memory, landlord_id, tenant_id, building_id, contract_id }
    }

    pub fn router(&self) -> Router {
        let store: Arc<dyn BillingStore> = Arc::new(self.memory.clone());
        build_router(AppState::with_store(store))
    }
}

/// Dispara uma requisição no router em processo e devolve status + corpo JSON (Null se vazio).
pub async fn send(
    router: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, json)
}

// =============================================================================
//  POSTGRES (só roda com TEST_DATABASE_URL)
// =============================================================================

pub async fn setup_pg() -> Option<PgPool> {
    let Ok(url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("Skipping test; TEST_DATABASE_URL não definida");
        return None;
    };

    let pool = match PgPoolOptions::new().max_connections(8).connect(&url).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("Skipping test; cannot connect to Postgres: {err:?}");
            return None;
        }
    };

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("falha ao aplicar migrações no banco de teste");

    Some(pool)
}

pub struct PgContract {
    pub landlord_id: i64,
    pub tenant_id: i64,
    pub building_id: i64,
    pub contract_id: i64,
}

/// Cria proprietário, inquilino, prédio e contrato novos (cada teste usa os seus).
pub async fn seed_pg_contract(pool: &PgPool, cadence: &str, start: NaiveDate) -> PgContract {
    let landlord_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (nickname, role, status) VALUES ($1, 'LANDLORD', 'ACTIVE') RETURNING id",
    )
    .bind("Sr. Park")
    .fetch_one(pool)
    .await
    .unwrap();

    let tenant_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (nickname, role, status) VALUES ($1, 'TENANT', 'ACTIVE') RETURNING id",
    )
    .bind("Kim")
    .fetch_one(pool)
    .await
    .unwrap();

    let building_id: i64 =
        sqlx::query_scalar("INSERT INTO buildings (owner_id, name) VALUES ($1, $2) RETURNING id")
            .bind(landlord_id)
            .bind("Edifício Aurora")
            .fetch_one(pool)
            .await
            .unwrap();

    let contract_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO contracts (tenant_id, building_id, room_number, payment_type, contract_start_date)
        VALUES ($1, $2, '301', $3::payment_cadence, $4)
        RETURNING id
        "#,
    )
    .bind(tenant_id)
    .bind(building_id)
    .bind(cadence)
    .bind(start)
    .fetch_one(pool)
    .await
    .unwrap();

    PgContract { landlord_id, tenant_id, building_id, contract_id }
}
