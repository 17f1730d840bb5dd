// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with figment.
//!
//! Lookup order, later wins: compiled defaults, `/etc/tally/tally.toml`,
//! `~/.config/tally/tally.toml`, `./tally.toml`, then `TALLY_*` variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TallyConfig;

/// Top-level sections that environment variables may address.
const ENV_SECTIONS: &[&str] = &["logging", "storage", "pricing", "quota", "cache"];

pub const SYSTEM_CONFIG_PATH: &str = "/etc/tally/tally.toml";
pub const LOCAL_CONFIG_PATH: &str = "tally.toml";

/// `~/.config/tally/tally.toml`, when a config dir is known.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tally").join("tally.toml"))
}

/// Load from the standard hierarchy with env overrides.
pub fn load_config() -> Result<TallyConfig, figment::Error> {
    build_figment().extract()
}

/// Load from a TOML string over the defaults. No files, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<TallyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load one explicit file, then apply env overrides.
pub fn load_config_from_path(path: &Path) -> Result<TallyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The unextracted figment behind [`load_config`].
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// `TALLY_<SECTION>_<KEY>` maps to `<section>.<key>`.
///
/// Only the first underscore after the section name becomes a dot, so
/// `TALLY_QUOTA_DAILY_TOKEN_LIMIT` lands on `quota.daily_token_limit`.
/// Figment hands the stripped key to `map` in its original case.
fn env_provider() -> Env {
    Env::prefixed("TALLY_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    ENV_SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or_else(|| key.clone())
}
