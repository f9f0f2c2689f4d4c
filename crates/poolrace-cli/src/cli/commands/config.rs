//! `poolrace config` – print the effective configuration.

use anyhow::Result;
use poolrace_core::config::{self, PoolraceConfig};

pub fn run_config(cfg: &PoolraceConfig) -> Result<()> {
    let mut shown = cfg.clone();
    for target in std::iter::once(&mut shown.store.write).chain(shown.store.read.iter_mut()) {
        if target.password.is_some() {
            target.password = Some("********".to_string());
        }
    }
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
