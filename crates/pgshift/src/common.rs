// ai
//! 📦 Common data structures: the building blocks of pgshift.
//!
//! 🎬 COLD OPEN: INT. DATA WAREHOUSE, 3:47 AM
//!
//! The analysts want yesterday's orders. The orders live in Postgres. The analysts
//! live in Redshift. Between them: an S3 bucket, a gzip stream, and these structs,
//! carrying table names and column lists across the void like a very boring relay team.
//!
//! 🧠 Knowledge graph:
//! - `TableDescriptor`: one source table, its warehouse name, its ordered columns
//! - `ColumnDescriptor`: name, source type, target type, copy expression
//! - `StagingArtifact`: the object keys one table's export lives under
//! - Built by `transforms` from catalog rows, consumed by `composers` and `supervisors`
//!
//! 🦆 (the duck is ordinal-ordered. it was there first.)

use std::fmt;

/// 📦 One column, as it travels from `information_schema` to a Redshift `CREATE TABLE`.
///
/// `copy_expression` is what goes in the export `SELECT`. For most types it's just
/// the quoted name. For types Redshift can't ingest natively it's a `CAST(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub source_type: String,
    pub target_type: String,
    pub copy_expression: String,
}

/// 🗂️ One table's worth of replication intent.
///
/// Invariants (enforced by `transforms::describe_table`, the only constructor in town):
/// - `columns` is non-empty and ordinal-ordered
/// - `target_name` is derived from `name` by the naming rule, never typed by hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// 📡 source schema, `public` unless someone got creative
    pub schema: String,
    pub name: String,
    pub target_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.target_name {
            write!(f, "{}.{}", self.schema, self.name)
        } else {
            write!(f, "{}.{} -> {}", self.schema, self.name, self.target_name)
        }
    }
}

/// 🪣 Where one table's export lives in the bucket.
///
/// Key convention:
/// - base:     `<prefix>/<target>.psv.gz`
/// - chunk N:  `<prefix>/<target>.psv.gz.<N>` (1-based, no zero padding)
/// - manifest: `<prefix>/<target>.psv.gz.manifest`
///
/// The base key itself is never written. It is the prefix Redshift matches in
/// prefix load mode, and the thing we pre-delete in case a previous tool wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArtifact {
    base_key: String,
}

impl StagingArtifact {
    pub fn new(export_prefix: &str, target_name: &str) -> Self {
        // -- 🧹 "export/" and "export" should land in the same place. slashes are not a personality.
        let trimmed_prefix = export_prefix.trim_end_matches('/');
        let base_key = if trimmed_prefix.is_empty() {
            format!("{target_name}.psv.gz")
        } else {
            format!("{trimmed_prefix}/{target_name}.psv.gz")
        };
        Self { base_key }
    }

    pub fn base_key(&self) -> &str {
        &self.base_key
    }

    pub fn chunk_key(&self, chunk_number: u32) -> String {
        format!("{}.{}", self.base_key, chunk_number)
    }

    pub fn manifest_key(&self) -> String {
        format!("{}.manifest", self.base_key)
    }

    /// 🔍 True for keys this artifact owns: the base key, any numbered chunk, or the manifest.
    ///
    /// `export/users.psv.gz.12` yes. `export/users.psv.gz.backup` no, not ours, don't touch.
    pub fn owns_key(&self, key: &str) -> bool {
        if key == self.base_key {
            return true;
        }
        match key
            .strip_prefix(self.base_key.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
        {
            Some("manifest") => true,
            Some(suffix) => !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()),
            None => false,
        }
    }
}

/// 🪣 What we know about an object after a listing. Size and key. That's the whole biography.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
}

/// ✅ A chunk that made it into the bucket, receipt (ETag) attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedChunk {
    pub number: u32,
    pub key: String,
    pub etag: String,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_keys_follow_the_psv_gz_convention() {
        let the_artifact = StagingArtifact::new("export", "orders");

        assert_eq!(the_artifact.base_key(), "export/orders.psv.gz");
        assert_eq!(the_artifact.chunk_key(1), "export/orders.psv.gz.1");
        assert_eq!(the_artifact.chunk_key(12), "export/orders.psv.gz.12");
        assert_eq!(the_artifact.manifest_key(), "export/orders.psv.gz.manifest");
    }

    #[test]
    fn the_one_where_trailing_slashes_and_empty_prefixes_behave() {
        assert_eq!(
            StagingArtifact::new("nightly/export/", "users").base_key(),
            "nightly/export/users.psv.gz"
        );
        assert_eq!(StagingArtifact::new("", "users").base_key(), "users.psv.gz");
    }

    #[test]
    fn the_one_where_the_artifact_only_claims_what_is_rightfully_its_own() {
        let the_artifact = StagingArtifact::new("export", "users");

        assert!(the_artifact.owns_key("export/users.psv.gz"));
        assert!(the_artifact.owns_key("export/users.psv.gz.1"));
        assert!(the_artifact.owns_key("export/users.psv.gz.42"));
        assert!(the_artifact.owns_key("export/users.psv.gz.manifest"));

        // 🚫 neighbours, impostors, and the trailing-dot goblin
        assert!(!the_artifact.owns_key("export/users.psv.gz."));
        assert!(!the_artifact.owns_key("export/users.psv.gz.backup"));
        assert!(!the_artifact.owns_key("export/users.psv.gz1"));
        assert!(!the_artifact.owns_key("export/users_archive.psv.gz.1"));
        assert!(!the_artifact.owns_key("export/user.psv.gz.1"));
    }

    #[test]
    fn the_one_where_display_admits_to_the_rename() {
        let the_table = TableDescriptor {
            schema: "public".to_string(),
            name: "orders_view".to_string(),
            target_name: "orders".to_string(),
            columns: vec![],
        };
        assert_eq!(the_table.to_string(), "public.orders_view -> orders");
    }
}
