//! `poolrace check` – authenticate against every target.

use anyhow::Result;
use poolrace_core::config::PoolraceConfig;
use poolrace_core::store::ReplicatedStore;

pub async fn run_check(cfg: &PoolraceConfig) -> Result<()> {
    let store = ReplicatedStore::connect_lazy(&cfg.store, 1)?;
    let res = store.authenticate().await;
    store.close().await;
    res?;
    println!(
        "ok: {} target(s) reachable ({:?}, database {})",
        store.target_count(),
        cfg.store.dialect,
        cfg.store.database
    );
    Ok(())
}
