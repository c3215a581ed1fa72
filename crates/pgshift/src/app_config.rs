//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. In `POSTGRES_TO_REDSHIFT_SOURCE_URI`. Nothing." 🦆
//!
//! 🏗️ Powered by Figment, layered like a lasagna:
//!   1. legacy env names from the Ruby-era cron job (`S3_DATABASE_EXPORT_BUCKET` and friends)
//!   2. `PGSHIFT_*` env vars, `__` for nesting (`PGSHIFT_RUNTIME__CHUNK_SIZE_BYTES`)
//!   3. an optional TOML file, which wins every argument

use anyhow::{Context, bail};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
    value::Uncased,
};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use tracing::info;

use crate::backends::{ObjectStoreConfig, PostgresSourceConfig, RedshiftTargetConfig};

/// 📏 one gibibyte. the default chunk threshold, measured in UNCOMPRESSED bytes.
pub const GIGABYTE: u64 = 1024 * 1024 * 1024;

/// 📦 The AppConfig: one struct to rule them all, built once in main() and handed
/// down by value. No lazy globals. No "who initialized the connection first" mysteries.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🐘 where the rows come from
    pub source: PostgresSourceConfig,
    /// 🔴 where the rows end up
    pub target: RedshiftTargetConfig,
    /// 🪣 the layover airport
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// ✅ Catch the configs that parse fine but would blow up forty minutes into a run.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.chunk_size_bytes == 0 {
            bail!("💀 runtime.chunk_size_bytes is 0. Every write would cut a chunk. The bucket would file a complaint.");
        }
        if self.runtime.upload_queue_capacity == 0 {
            bail!("💀 runtime.upload_queue_capacity must be at least 1. A zero-slot queue is just a wall.");
        }
        if self.object_store.iam_role.is_none()
            && (self.object_store.access_key_id.is_none()
                || self.object_store.secret_access_key.is_none())
        {
            bail!(
                "💀 Redshift needs a way into the bucket: set object_store.iam_role, \
                 or both object_store.access_key_id and object_store.secret_access_key"
            );
        }
        Ok(())
    }
}

/// 🗺️ How the bulk load finds the chunks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// 📜 upload a manifest listing every chunk URL, `COPY ... MANIFEST`. exact. boring. correct.
    #[default]
    Manifest,
    /// 🔍 `COPY ... FROM 's3://bucket/export/t.psv.gz'`, which Redshift treats as a key prefix.
    /// relies on the pre-clean to keep stale chunks out of the prefix.
    Prefix,
}

/// 🎛️ Runtime knobs: chunk sizes, skip lists, and how much of the table we pretend not to see.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📏 cut a chunk once this many uncompressed bytes went into the compressor
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: u64,
    /// 🙈 tables we never replicate. accepts a list, or a comma-separated string (hi, SKIP_TABLES)
    #[serde(default, deserialize_with = "deserialize_table_list")]
    pub skip_tables: Vec<String>,
    /// 🚫 column types Redshift can't take. dropped from both export and DDL, silently.
    #[serde(default = "default_unsupported_types")]
    pub unsupported_types: Vec<String>,
    #[serde(default)]
    pub load_mode: LoadMode,
    /// 📬 sealed chunks allowed to wait for upload while the next one compresses
    #[serde(default = "default_upload_queue_capacity")]
    pub upload_queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: default_chunk_size_bytes(),
            skip_tables: Vec::new(),
            unsupported_types: default_unsupported_types(),
            load_mode: LoadMode::default(),
            upload_queue_capacity: default_upload_queue_capacity(),
        }
    }
}

fn default_chunk_size_bytes() -> u64 {
    GIGABYTE
}

fn default_unsupported_types() -> Vec<String> {
    vec!["uuid".to_string()]
}

fn default_upload_queue_capacity() -> usize {
    1
}

/// 🔪 `"a, b,,c"` → `["a", "b", "c"]`, and `["a", "b"]` → `["a", "b"]`.
fn deserialize_table_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TableList {
        CommaSeparated(String),
        List(Vec<String>),
    }

    let tables = match TableList::deserialize(deserializer)? {
        TableList::CommaSeparated(raw) => raw.split(',').map(str::to_string).collect(),
        TableList::List(list) => list,
    };
    Ok(tables
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

/// 📜 The environment variable names the original cron job used, and where they live now.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("POSTGRES_TO_REDSHIFT_SOURCE_URI", "source.uri"),
    ("POSTGRES_TO_REDSHIFT_TARGET_URI", "target.uri"),
    ("POSTGRES_TO_REDSHIFT_TARGET_SCHEMA", "target.schema"),
    ("S3_DATABASE_EXPORT_ID", "object_store.access_key_id"),
    ("S3_DATABASE_EXPORT_KEY", "object_store.secret_access_key"),
    ("S3_DATABASE_EXPORT_BUCKET", "object_store.bucket"),
    ("S3_REGION", "object_store.region"),
    ("SKIP_TABLES", "runtime.skip_tables"),
];

fn legacy_env() -> Env {
    let the_names: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&the_names).map(|key| {
        LEGACY_ENV_KEYS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| Uncased::from(*path))
            .unwrap_or_else(|| Uncased::from(key.as_str().to_string()))
    })
}

/// 🏗️ Stack the layers. Later merges win.
fn build_figment(config_file_name: Option<&Path>) -> Figment {
    let figment = Figment::new()
        .merge(legacy_env())
        .merge(Env::prefixed("PGSHIFT_").split("__"));

    match config_file_name {
        Some(file_name) => figment.merge(Toml::file(file_name)),
        None => figment,
    }
}

/// 🚀 Load the config from env vars and an optional TOML file, then validate it.
///
/// 📐 If `config_file_name` is None → env vars only. No file. No assumptions.
/// If Some → env vars + TOML, merged. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (PGSHIFT_*, legacy names). \
             The file exists in our hearts, but apparently not in a shape serde likes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (PGSHIFT_*, legacy names). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    let app_config: AppConfig = build_figment(config_file_name)
        .extract()
        .context(context_msg)?;
    app_config.validate()?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const THE_MINIMAL_TOML: &str = r#"
        [source]
        uri = "postgres://reader@localhost:5432/app"

        [target]
        uri = "postgres://loader@warehouse:5439/dw"
        schema = "analytics"

        [object_store]
        bucket = "db-exports"
        access_key_id = "AKIA_TEST"
        secret_access_key = "shh"
    "#;

    #[test]
    fn the_one_where_a_minimal_toml_gets_every_default() {
        Jail::expect_with(|jail| {
            jail.create_file("pgshift.toml", THE_MINIMAL_TOML)?;

            let the_config = load_config(Some(Path::new("pgshift.toml")))
                .map_err(|e| figment::Error::from(e.to_string()))?;

            assert_eq!(the_config.target.schema, "analytics");
            assert_eq!(the_config.source.schema, "public");
            assert_eq!(the_config.object_store.region, "us-east-1");
            assert_eq!(the_config.object_store.export_prefix, "export");
            assert_eq!(the_config.runtime.chunk_size_bytes, GIGABYTE);
            assert_eq!(the_config.runtime.unsupported_types, vec!["uuid".to_string()]);
            assert_eq!(the_config.runtime.load_mode, LoadMode::Manifest);
            assert_eq!(the_config.runtime.upload_queue_capacity, 1);
            assert!(the_config.runtime.skip_tables.is_empty());
            Ok(())
        });
    }

    #[test]
    fn the_one_where_the_ruby_era_env_vars_still_work() {
        Jail::expect_with(|jail| {
            jail.set_env("POSTGRES_TO_REDSHIFT_SOURCE_URI", "postgres://old@src/app");
            jail.set_env("POSTGRES_TO_REDSHIFT_TARGET_URI", "postgres://old@rs:5439/dw");
            jail.set_env("POSTGRES_TO_REDSHIFT_TARGET_SCHEMA", "legacy");
            jail.set_env("S3_DATABASE_EXPORT_ID", "AKIA_LEGACY");
            jail.set_env("S3_DATABASE_EXPORT_KEY", "legacy-secret");
            jail.set_env("S3_DATABASE_EXPORT_BUCKET", "legacy-bucket");
            jail.set_env("S3_REGION", "eu-west-1");
            jail.set_env("SKIP_TABLES", "schema_migrations, ar_internal_metadata");

            let the_config = load_config(None).map_err(|e| figment::Error::from(e.to_string()))?;

            assert_eq!(the_config.source.uri.expose(), "postgres://old@src/app");
            assert_eq!(the_config.target.schema, "legacy");
            assert_eq!(the_config.object_store.bucket, "legacy-bucket");
            assert_eq!(the_config.object_store.region, "eu-west-1");
            assert_eq!(
                the_config.object_store.access_key_id.as_deref(),
                Some("AKIA_LEGACY")
            );
            assert_eq!(
                the_config.runtime.skip_tables,
                vec!["schema_migrations".to_string(), "ar_internal_metadata".to_string()]
            );
            Ok(())
        });
    }

    #[test]
    fn the_one_where_prefixed_env_vars_nest_and_toml_wins() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pgshift.toml",
                &format!("{THE_MINIMAL_TOML}\n[runtime]\nload_mode = \"prefix\"\n"),
            )?;
            jail.set_env("PGSHIFT_RUNTIME__CHUNK_SIZE_BYTES", "4096");
            jail.set_env("PGSHIFT_RUNTIME__LOAD_MODE", "manifest");
            jail.set_env("PGSHIFT_TARGET__SCHEMA", "overridden_by_toml");

            let the_config = load_config(Some(Path::new("pgshift.toml")))
                .map_err(|e| figment::Error::from(e.to_string()))?;

            assert_eq!(the_config.runtime.chunk_size_bytes, 4096);
            assert_eq!(the_config.runtime.load_mode, LoadMode::Prefix);
            assert_eq!(the_config.target.schema, "analytics");
            Ok(())
        });
    }

    #[test]
    fn the_one_where_a_zero_byte_chunk_threshold_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pgshift.toml",
                &format!("{THE_MINIMAL_TOML}\n[runtime]\nchunk_size_bytes = 0\n"),
            )?;

            let the_result = load_config(Some(Path::new("pgshift.toml")));
            assert!(the_result.is_err(), "a 0-byte threshold should never pass validation");
            Ok(())
        });
    }

    #[test]
    fn the_one_where_redshift_without_credentials_is_turned_away() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pgshift.toml",
                r#"
                [source]
                uri = "postgres://reader@localhost/app"
                [target]
                uri = "postgres://loader@warehouse/dw"
                schema = "analytics"
                [object_store]
                bucket = "db-exports"
                "#,
            )?;

            let the_err = load_config(Some(Path::new("pgshift.toml")))
                .expect_err("💀 no iam_role and no keys should fail validation");
            assert!(the_err.to_string().contains("iam_role"));
            Ok(())
        });
    }

    #[test]
    fn the_one_where_runtime_accepts_a_real_toml_list_for_skip_tables() {
        let the_runtime: RuntimeConfig = toml::from_str(
            r#"
            skip_tables = ["sessions", " audit_log "]
            unsupported_types = ["uuid", "tsvector"]
            upload_queue_capacity = 3
            "#,
        )
        .expect("💀 runtime TOML should parse");

        assert_eq!(
            the_runtime.skip_tables,
            vec!["sessions".to_string(), "audit_log".to_string()]
        );
        assert_eq!(the_runtime.unsupported_types.len(), 2);
        assert_eq!(the_runtime.upload_queue_capacity, 3);
        assert_eq!(the_runtime.chunk_size_bytes, GIGABYTE);
    }
}
