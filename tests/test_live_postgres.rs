//! Full workflow against a real Postgres. Runs only when `TEST_DATABASE_URL`
//! points at a disposable database. Each test uses its own tenant id and
//! tables so they can run in parallel.

use serde_json::json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tenant_sync::infra::tenant_config::StaticTenantConfigProvider;
use tenant_sync::storage::tenant_pool::application_name;
use tenant_sync::{
    InferenceOptions, Record, Settings, SettlePolicy, SyncErrorKind, TenantConnectionRegistry,
    UpsertService,
};

fn records(value: serde_json::Value) -> Vec<Record> {
    serde_json::from_value(value).unwrap()
}

fn live_url() -> Option<String> {
    dotenv::dotenv().ok();
    match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            println!("TEST_DATABASE_URL not set; skipping live Postgres test");
            None
        }
    }
}

fn registry(settings: Settings) -> Arc<TenantConnectionRegistry> {
    Arc::new(TenantConnectionRegistry::new(
        settings,
        Arc::new(StaticTenantConfigProvider::new()),
    ))
}

fn service(registry: &Arc<TenantConnectionRegistry>) -> UpsertService {
    UpsertService::new(
        registry.clone(),
        SettlePolicy {
            attempts: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
        },
        InferenceOptions::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_upsert_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let registry = registry(Settings {
        database_url: Some(url),
        ..Settings::default()
    });
    let svc = service(&registry);

    let pool = registry.get("live").await?.pool;
    for table in ["live_orders", "live_metrics"] {
        sqlx::query(&format!("DROP TABLE IF EXISTS public.{}", table))
            .execute(&pool)
            .await?;
    }

    // create + last-record-wins
    let result = svc
        .upsert(
            "live",
            "live_orders",
            &records(json!([
                {"id": 1, "total": 9.99, "placed_at": "2024-01-05 10:00:00"},
                {"id": 1, "total": 19.99, "placed_at": "2024-01-06 10:00:00"}
            ])),
        )
        .await;
    assert!(result.success, "{}", result.message);

    // the create path recycled the pool
    let pool = registry.get("live").await?.pool;
    let row = sqlx::query("SELECT total::float8 AS total FROM public.live_orders WHERE id = 1")
        .fetch_one(&pool)
        .await?;
    let total: f64 = row.try_get("total")?;
    assert!((total - 19.99).abs() < 0.001);

    // additive evolution on an existing keyless table
    sqlx::query("CREATE TABLE public.live_metrics (ts TIMESTAMP, value REAL)")
        .execute(&pool)
        .await?;
    let result = svc
        .upsert(
            "live",
            "live_metrics",
            &records(json!([{"ts": "2024-03-01 12:00:00", "value": 0.5, "tag": "cpu"}])),
        )
        .await;
    assert!(result.success, "{}", result.message);
    let cols: Vec<String> = sqlx::query(
        "SELECT column_name::text AS c FROM information_schema.columns
         WHERE table_schema = 'public' AND table_name = 'live_metrics' ORDER BY ordinal_position",
    )
    .fetch_all(&pool)
    .await?
    .iter()
    .map(|r| r.try_get("c"))
    .collect::<Result<_, _>>()?;
    assert_eq!(cols, vec!["ts", "value", "tag"]);

    // a later record with an unsampled field fails the table
    let result = svc
        .upsert(
            "live",
            "live_orders",
            &records(json!([{"id": 2, "total": 1.0}, {"id": 3, "total": 2.0, "coupon": "X"}])),
        )
        .await;
    assert_eq!(result.error_kind, Some(SyncErrorKind::Upsert));
    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM public.live_orders")
        .fetch_one(&pool)
        .await?
        .try_get("n")?;
    assert_eq!(count, 1);

    registry.close_all().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_enum_inet_and_array_columns() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let admin = PgPool::connect(&url).await?;
    for sql in [
        "DROP TABLE IF EXISTS public.live_visits",
        "DROP TYPE IF EXISTS public.live_mood",
        "CREATE TYPE public.live_mood AS ENUM ('ok', 'bad')",
        "CREATE TABLE public.live_visits (
            id BIGINT PRIMARY KEY, m public.live_mood, ip INET, tags TEXT[], flag BOOLEAN)",
    ] {
        sqlx::query(sql).execute(&admin).await?;
    }

    let registry = registry(Settings {
        database_url: Some(url),
        ..Settings::default()
    });
    let svc = service(&registry);

    let result = svc
        .upsert(
            "live_udt",
            "live_visits",
            &records(json!([
                {"id": 1, "m": "ok", "ip": "10.0.0.1", "tags": ["a", "b c"], "flag": true},
                {"id": 2, "m": "bad", "ip": "192.168.1.7", "tags": [], "flag": false}
            ])),
        )
        .await;
    assert!(result.success, "{}", result.message);

    // NULL into a non-builtin column; fields outside the batch stay untouched
    let result = svc
        .upsert("live_udt", "live_visits", &records(json!([{"id": 1, "ip": null}])))
        .await;
    assert!(result.success, "{}", result.message);

    let rows = sqlx::query(
        "SELECT id, m::text AS m, host(ip) AS ip, array_to_string(tags, '|') AS tags
         FROM public.live_visits ORDER BY id",
    )
    .fetch_all(&admin)
    .await?;
    let first: (Option<String>, Option<String>) = (rows[0].try_get("m")?, rows[0].try_get("ip")?);
    assert_eq!(first, (Some("ok".to_string()), None));
    let m: Option<String> = rows[1].try_get("m")?;
    let ip: Option<String> = rows[1].try_get("ip")?;
    let tags: Option<String> = rows[1].try_get("tags")?;
    assert_eq!(m.as_deref(), Some("bad"));
    assert_eq!(ip.as_deref(), Some("192.168.1.7"));
    assert_eq!(tags.as_deref(), Some(""));

    registry.close_all().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_live_concurrent_first_use_opens_one_pool() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let registry = registry(Settings {
        database_url: Some(url.clone()),
        ..Settings::default()
    });

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move { registry.get("live_concurrent").await }));
    }
    for handle in handles {
        handle.await??;
    }
    assert_eq!(registry.active_tenants(), vec!["live_concurrent".to_string()]);

    let observer = PgPool::connect(&url).await?;
    let open: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM pg_stat_activity WHERE application_name = $1",
    )
    .bind(application_name("live_concurrent"))
    .fetch_one(&observer)
    .await?
    .try_get("n")?;
    assert_eq!(open, 1);

    registry.close_all().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_failed_upserts_release_their_connection() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let admin = PgPool::connect(&url).await?;
    sqlx::query("DROP TABLE IF EXISTS public.live_single")
        .execute(&admin)
        .await?;
    sqlx::query("CREATE TABLE public.live_single (id BIGINT PRIMARY KEY, total REAL)")
        .execute(&admin)
        .await?;

    let mut settings = Settings {
        database_url: Some(url),
        ..Settings::default()
    };
    settings.pool.max_connections = 1;
    settings.pool.acquire_timeout = Duration::from_secs(3);
    let registry = registry(settings);
    let svc = service(&registry);

    let failing = records(json!([{"id": 1, "total": 1.0}, {"id": 2, "total": 2.0, "coupon": "X"}]));
    for _ in 0..3 {
        let result = svc.upsert("live_single", "live_single", &failing).await;
        assert_eq!(result.error_kind, Some(SyncErrorKind::Upsert));
    }

    // a leaked connection would surface here as an acquire timeout
    let result = svc
        .upsert("live_single", "live_single", &records(json!([{"id": 1, "total": 5.0}])))
        .await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.rows_written, 1);

    registry.close_all().await;
    Ok(())
}
