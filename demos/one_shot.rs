//! # Example: one_shot
//!
//! A one-shot migration process.
//!
//! Demonstrates:
//! - Calling `up` before the host is ready (the call is buffered and replayed).
//! - A step continuation that seeds data before the next step runs.
//! - Error tolerance: a failing statement is logged and skipped.
//! - The idle exit: the host shuts down ~3s after the run, then the process exits.
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example one_shot --features logging
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use migravisor::{
    Config, Driver, DriverRef, Engine, HookError, HookFn, Host, HostRef, LogWriter, Param,
    StatementError, Subscribe,
};
use tracing_subscriber::EnvFilter;

/// Keeps one row count per "table"; fails on statements mentioning `broken`.
#[derive(Default)]
struct MemoryDb {
    tables: Mutex<BTreeMap<String, usize>>,
}

#[async_trait]
impl Driver for MemoryDb {
    async fn execute(&self, statement: &str, params: &[Param]) -> Result<(), StatementError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if statement.contains("broken") {
            return Err(StatementError::new("no such table: broken"));
        }
        let table = statement
            .split_whitespace()
            .last()
            .unwrap_or("unknown")
            .to_string();
        let mut tables = self.tables.lock().unwrap_or_else(|p| p.into_inner());
        *tables.entry(table).or_default() += params.len().max(1);
        Ok(())
    }
}

struct AppHost;

#[async_trait]
impl Host for AppHost {
    fn name(&self) -> &str {
        "demo-app"
    }

    async fn shutdown(&self) -> Result<(), HookError> {
        tracing::info!("host shutting down");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let seed = HookFn::arc(|db: DriverRef| async move {
        db.execute("INSERT INTO users", &[Param::from("ada"), Param::from("grace")])
            .await
            .map_err(|e| HookError::new(e.message))
    });
    let done = HookFn::arc(|_db: DriverRef| async {
        tracing::info!("apply queue drained");
        Ok::<(), HookError>(())
    });

    let (engine, ready) = Engine::builder(Config::default())
        .verbose(true)
        .ignore_errors(true)
        .apply_then("CREATE TABLE users", vec![], seed)
        .apply("ALTER TABLE broken", vec![])
        .apply("CREATE INDEX users_name ON users", vec![])
        .revert("DROP TABLE users", vec![])
        .on_apply_complete(done)
        .with_subscribers(subs)
        .build();

    let db = Arc::new(MemoryDb::default());
    let up = tokio::spawn({
        let engine = engine.clone();
        let db: DriverRef = db.clone();
        async move { engine.up(db).await }
    });

    // The host takes a moment to boot; the `up` call above waits for it.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let host: HostRef = Arc::new(AppHost);
    ready.ready(Some(host));

    up.await??;
    engine.log(format!("tables: {:?}", db.tables.lock().unwrap_or_else(|p| p.into_inner())));

    // Nothing else arrives: the idle timer shuts the host down and exits the process.
    std::future::pending::<()>().await;
    Ok(())
}
