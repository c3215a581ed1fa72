// ai
//! 🎬 *[the descriptor is ready. the artifact is uploaded. the warehouse hungers.]*
//! *["Compose me," whispers the statement. "Make me valid SQL."]*
//!
//! 🎼 The Composers module: every SQL string and manifest pgshift sends anywhere.
//!
//! 🧠 Knowledge graph:
//! - **export**: `COPY (SELECT ...) TO STDOUT WITH DELIMITER '|'` for the source
//! - **DDL**: `CREATE TABLE [IF NOT EXISTS]` from the column descriptors
//! - **swap**: DROP `_updating` → RENAME live → CREATE → COPY FROM S3, for the warehouse
//! - **manifest**: the JSON Redshift reads to find exactly our chunks, nothing else
//! - every warehouse statement carries a `loggable` twin with credentials scrubbed
//!
//! Composers build strings. They never send them. Sending is someone else's job,
//! and that someone else has a connection and anxiety. 🦆

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::app_config::LoadMode;
use crate::backends::ObjectStoreConfig;
use crate::backends::common_config::{ConfigSecret, quote_ident, quote_literal};
use crate::common::{StagingArtifact, TableDescriptor, UploadedChunk};

/// 📏 The field delimiter, on both ends. A pipe. Classic. Rarely in the data. (Rarely.)
pub const DELIMITER: char = '|';

/// 🏷️ The suffix the previous generation wears after the swap.
pub const UPDATING_SUFFIX: &str = "_updating";

// ===== Export side =====

/// 📡 The bulk-export command for one table: rendered columns, ordinal order, pipe-delimited text.
pub fn copy_out_query(table: &TableDescriptor) -> String {
    let the_columns = table
        .columns
        .iter()
        .map(|c| c.copy_expression.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "COPY (SELECT {} FROM {}.{}) TO STDOUT WITH DELIMITER '{}'",
        the_columns,
        quote_ident(&table.schema),
        quote_ident(&table.name),
        DELIMITER
    )
}

// ===== DDL =====

/// 🏗️ `"id" integer, "email" character varying, ...` in ordinal order.
pub fn columns_for_create(table: &TableDescriptor) -> String {
    table
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.target_type))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 🏗️ Idempotent create, run by the supervisor before each export. First run creates, later runs shrug.
pub fn create_table_if_not_exists(target_schema: &str, table: &TableDescriptor) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} ({})",
        quote_ident(target_schema),
        quote_ident(&table.target_name),
        columns_for_create(table)
    )
}

// ===== Bulk-load authorization =====

/// 🔑 How Redshift proves to S3 that it's allowed in.
#[derive(Debug, Clone)]
pub enum CopyAuthorization {
    /// 🗝️ inline keys, the way the original cron job did it
    Keys {
        access_key_id: String,
        secret_access_key: ConfigSecret,
    },
    /// 🎩 an IAM role attached to the cluster. no secrets in SQL at all.
    IamRole(String),
}

impl CopyAuthorization {
    /// 🔧 IAM role wins if configured, else keys. Neither? That's a config error.
    pub fn from_config(config: &ObjectStoreConfig) -> Result<Self> {
        if let Some(role) = &config.iam_role {
            return Ok(Self::IamRole(role.clone()));
        }
        match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Self::Keys {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
            }),
            _ => bail!(
                "💀 No way to authorize the Redshift COPY: configure object_store.iam_role \
                 or both object_store.access_key_id and object_store.secret_access_key"
            ),
        }
    }

    fn render(&self, redacted: bool) -> String {
        match self {
            Self::IamRole(role) => format!("IAM_ROLE {}", quote_literal(role)),
            Self::Keys {
                access_key_id,
                secret_access_key,
            } => {
                let the_secret = if redacted {
                    "[REDACTED]"
                } else {
                    secret_access_key.expose()
                };
                format!(
                    "CREDENTIALS {}",
                    quote_literal(&format!(
                        "aws_access_key_id={access_key_id};aws_secret_access_key={the_secret}"
                    ))
                )
            }
        }
    }
}

// ===== Swap sequence =====

/// 📜 One warehouse statement and its log-safe twin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 🏷️ short name for logs and error context: "drop stale", "rename live", ...
    pub step: &'static str,
    pub sql: String,
    /// 🔒 same SQL with credentials scrubbed. the only version that may reach a log line.
    pub loggable: String,
}

impl Statement {
    fn plain(step: &'static str, sql: String) -> Self {
        Self {
            step,
            loggable: sql.clone(),
            sql,
        }
    }
}

/// 🗺️ Where the bulk load reads from, and whether it's a manifest.
pub fn bulk_load_source(bucket: &str, artifact: &StagingArtifact, mode: LoadMode) -> String {
    match mode {
        LoadMode::Manifest => format!("s3://{}/{}", bucket, artifact.manifest_key()),
        LoadMode::Prefix => format!("s3://{}/{}", bucket, artifact.base_key()),
    }
}

/// 🔄 The rename-swap, minus BEGIN/COMMIT (the loader owns the transaction).
///
/// 1. drop `<target>_updating` (leftover from a previous run)
/// 2. rename live `<target>` → `<target>_updating`
/// 3. create a fresh `<target>`
/// 4. COPY the artifact into it
pub fn swap_statements(
    target_schema: &str,
    table: &TableDescriptor,
    bucket: &str,
    artifact: &StagingArtifact,
    mode: LoadMode,
    authorization: &CopyAuthorization,
) -> Vec<Statement> {
    let the_schema = quote_ident(target_schema);
    let the_target = quote_ident(&table.target_name);
    let the_updating_name = format!("{}{}", table.target_name, UPDATING_SUFFIX);
    let the_updating = quote_ident(&the_updating_name);

    let the_source = quote_literal(&bulk_load_source(bucket, artifact, mode));
    let the_manifest_flag = match mode {
        LoadMode::Manifest => " MANIFEST",
        LoadMode::Prefix => "",
    };
    let copy_sql = |redacted: bool| {
        format!(
            "COPY {the_schema}.{the_target} FROM {the_source} {} GZIP TRUNCATECOLUMNS ESCAPE DELIMITER AS '{DELIMITER}'{the_manifest_flag}",
            authorization.render(redacted)
        )
    };

    vec![
        Statement::plain(
            "drop stale",
            format!("DROP TABLE IF EXISTS {the_schema}.{the_updating}"),
        ),
        Statement::plain(
            "rename live",
            format!("ALTER TABLE {the_schema}.{the_target} RENAME TO {the_updating}"),
        ),
        Statement::plain(
            "create fresh",
            format!(
                "CREATE TABLE {the_schema}.{the_target} ({})",
                columns_for_create(table)
            ),
        ),
        Statement {
            step: "bulk load",
            sql: copy_sql(false),
            loggable: copy_sql(true),
        },
    ]
}

// ===== Manifest =====

#[derive(Debug, Serialize)]
struct Manifest {
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    url: String,
    mandatory: bool,
}

/// 📜 Redshift COPY manifest listing every uploaded chunk, in chunk order, all mandatory.
///
/// `mandatory: true` means Redshift fails the COPY if a chunk is missing instead of
/// quietly loading a partial table. Quiet partial tables are the whole thing we're avoiding.
pub fn manifest_json(bucket: &str, chunks: &[UploadedChunk]) -> Result<String> {
    let mut ordered: Vec<&UploadedChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.number);

    let the_manifest = Manifest {
        entries: ordered
            .into_iter()
            .map(|chunk| ManifestEntry {
                url: format!("s3://{}/{}", bucket, chunk.key),
                mandatory: true,
            })
            .collect(),
    };
    serde_json::to_string_pretty(&the_manifest)
        .context("💀 Failed to serialize the COPY manifest. It was a list of URLs. How.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ColumnDescriptor;

    fn the_users_table() -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: "users_view".to_string(),
            target_name: "users".to_string(),
            columns: vec![
                ColumnDescriptor {
                    name: "id".to_string(),
                    source_type: "integer".to_string(),
                    target_type: "integer".to_string(),
                    copy_expression: "\"id\"".to_string(),
                },
                ColumnDescriptor {
                    name: "bio".to_string(),
                    source_type: "text".to_string(),
                    target_type: "CHARACTER VARYING(65535)".to_string(),
                    copy_expression: "CAST(\"bio\" AS CHARACTER VARYING(65535)) AS \"bio\""
                        .to_string(),
                },
            ],
        }
    }

    fn the_keys() -> CopyAuthorization {
        CopyAuthorization::Keys {
            access_key_id: "AKIA_TEST".to_string(),
            secret_access_key: ConfigSecret::new("sup3r-s3cret"),
        }
    }

    #[test]
    fn the_one_where_the_export_query_renders_columns_in_order() {
        assert_eq!(
            copy_out_query(&the_users_table()),
            "COPY (SELECT \"id\", CAST(\"bio\" AS CHARACTER VARYING(65535)) AS \"bio\" \
             FROM \"public\".\"users_view\") TO STDOUT WITH DELIMITER '|'"
        );
    }

    #[test]
    fn the_one_where_create_if_not_exists_uses_the_target_name() {
        assert_eq!(
            create_table_if_not_exists("analytics", &the_users_table()),
            "CREATE TABLE IF NOT EXISTS \"analytics\".\"users\" \
             (\"id\" integer, \"bio\" CHARACTER VARYING(65535))"
        );
    }

    #[test]
    fn the_one_where_the_swap_happens_in_exactly_four_acts() {
        let the_artifact = StagingArtifact::new("export", "users");
        let the_statements = swap_statements(
            "analytics",
            &the_users_table(),
            "db-exports",
            &the_artifact,
            LoadMode::Prefix,
            &the_keys(),
        );

        let the_sql: Vec<&str> = the_statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            the_sql[0],
            "DROP TABLE IF EXISTS \"analytics\".\"users_updating\""
        );
        assert_eq!(
            the_sql[1],
            "ALTER TABLE \"analytics\".\"users\" RENAME TO \"users_updating\""
        );
        assert!(the_sql[2].starts_with("CREATE TABLE \"analytics\".\"users\" ("));
        assert_eq!(
            the_sql[3],
            "COPY \"analytics\".\"users\" FROM 's3://db-exports/export/users.psv.gz' \
             CREDENTIALS 'aws_access_key_id=AKIA_TEST;aws_secret_access_key=sup3r-s3cret' \
             GZIP TRUNCATECOLUMNS ESCAPE DELIMITER AS '|'"
        );
        assert_eq!(the_statements.len(), 4);
    }

    #[test]
    fn the_one_where_secrets_never_make_it_into_the_logs() {
        let the_artifact = StagingArtifact::new("export", "users");
        let the_statements = swap_statements(
            "analytics",
            &the_users_table(),
            "db-exports",
            &the_artifact,
            LoadMode::Manifest,
            &the_keys(),
        );

        for statement in &the_statements {
            assert!(
                !statement.loggable.contains("sup3r-s3cret"),
                "step '{}' leaked the secret into its loggable form",
                statement.step
            );
        }
        let the_copy = &the_statements[3];
        assert!(the_copy.sql.contains("sup3r-s3cret"), "the real SQL still needs the key");
        assert!(the_copy.loggable.contains("[REDACTED]"));
    }

    #[test]
    fn the_one_where_manifest_mode_points_at_the_manifest() {
        let the_artifact = StagingArtifact::new("export", "users");
        let the_statements = swap_statements(
            "analytics",
            &the_users_table(),
            "db-exports",
            &the_artifact,
            LoadMode::Manifest,
            &CopyAuthorization::IamRole("arn:aws:iam::123:role/loader".to_string()),
        );

        assert_eq!(
            the_statements[3].sql,
            "COPY \"analytics\".\"users\" FROM 's3://db-exports/export/users.psv.gz.manifest' \
             IAM_ROLE 'arn:aws:iam::123:role/loader' \
             GZIP TRUNCATECOLUMNS ESCAPE DELIMITER AS '|' MANIFEST"
        );
    }

    #[test]
    fn the_one_where_the_manifest_lists_every_chunk_in_order() -> Result<()> {
        let the_chunk = |number: u32| UploadedChunk {
            number,
            key: format!("export/users.psv.gz.{number}"),
            etag: format!("\"etag-{number}\""),
            uncompressed_bytes: 10,
            compressed_bytes: 5,
        };

        let the_json = manifest_json("db-exports", &[the_chunk(2), the_chunk(1), the_chunk(3)])?;
        let the_parsed: serde_json::Value = serde_json::from_str(&the_json)?;
        let the_urls: Vec<&str> = the_parsed["entries"]
            .as_array()
            .expect("💀 entries should be an array")
            .iter()
            .map(|e| e["url"].as_str().unwrap_or_default())
            .collect();

        assert_eq!(
            the_urls,
            vec![
                "s3://db-exports/export/users.psv.gz.1",
                "s3://db-exports/export/users.psv.gz.2",
                "s3://db-exports/export/users.psv.gz.3",
            ]
        );
        assert!(the_parsed["entries"][0]["mandatory"].as_bool().unwrap_or(false));
        Ok(())
    }

    #[test]
    fn the_one_where_no_credentials_means_no_authorization() {
        let the_config: ObjectStoreConfig =
            serde_json::from_str(r#"{ "bucket": "db-exports" }"#).expect("💀 bucket-only config parses");
        assert!(CopyAuthorization::from_config(&the_config).is_err());
    }
}
