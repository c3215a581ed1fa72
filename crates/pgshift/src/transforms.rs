// ai
//! 🔄 Transforms: the Rosetta Stone between `information_schema` and Redshift DDL 🎭
//!
//! 🎬 COLD OPEN: INT. SIMULTANEOUS TRANSLATION BOOTH, 2:47 AM
//!
//! Postgres says `jsonb`. Redshift says "I don't know her". The translator sighs,
//! reaches for `CHARACTER VARYING(65535)`, and wraps the column in a `CAST` so the
//! export hands over plain text. Nobody thanks the translator. The translator is used to it.
//!
//! ## What lives here
//! - the type map: which source types get cast for copy, and to what
//! - the naming rule: `orders_view` lands in the warehouse as `orders`
//! - `describe_table`: catalog rows in, a `TableDescriptor` (or a polite `None`) out
//! - `select_tables`: which discovered tables make the cut
//!
//! Everything here is pure. No connections, no I/O, no drama. Just strings in, strings out.
//! The borrow checker finds this module relaxing. 🦆

use crate::backends::common_config::quote_ident;
use crate::backends::{CatalogColumn, CatalogTable};
use crate::common::{ColumnDescriptor, TableDescriptor};
use tracing::debug;

/// 📏 Redshift's widest VARCHAR. Everything text-shaped lands here.
const WIDEST_VARCHAR: &str = "CHARACTER VARYING(65535)";

/// 🎭 Source types Redshift can't ingest as-is, and what they become on the way over.
///
/// `ARRAY` and `USER-DEFINED` are what `information_schema.columns.data_type`
/// reports for arrays and enums/domains. They travel as their text rendering.
const CAST_TYPES_FOR_COPY: &[(&str, &str)] = &[
    ("text", WIDEST_VARCHAR),
    ("json", WIDEST_VARCHAR),
    ("jsonb", WIDEST_VARCHAR),
    ("bytea", WIDEST_VARCHAR),
    ("oid", WIDEST_VARCHAR),
    ("ARRAY", WIDEST_VARCHAR),
    ("USER-DEFINED", WIDEST_VARCHAR),
    ("interval", WIDEST_VARCHAR),
    ("money", "DECIMAL(19,2)"),
];

/// 🎯 The warehouse type for a source type, if it needs a cast. `None` means "same as source".
fn cast_type_for(source_type: &str) -> Option<&'static str> {
    CAST_TYPES_FOR_COPY
        .iter()
        .find(|(source, _)| *source == source_type)
        .map(|(_, target)| *target)
}

/// 🏷️ The naming rule: strip one trailing `_view`. Everything else keeps its name.
pub fn target_table_name(source_name: &str) -> String {
    source_name
        .strip_suffix("_view")
        .filter(|stripped| !stripped.is_empty())
        .unwrap_or(source_name)
        .to_string()
}

/// 🔄 One catalog column → one `ColumnDescriptor`.
pub fn describe_column(column: &CatalogColumn) -> ColumnDescriptor {
    let quoted = quote_ident(&column.name);
    match cast_type_for(&column.data_type) {
        Some(target_type) => ColumnDescriptor {
            name: column.name.clone(),
            source_type: column.data_type.clone(),
            target_type: target_type.to_string(),
            copy_expression: format!("CAST({quoted} AS {target_type}) AS {quoted}"),
        },
        None => ColumnDescriptor {
            name: column.name.clone(),
            source_type: column.data_type.clone(),
            target_type: column.data_type.clone(),
            copy_expression: quoted,
        },
    }
}

/// 🗂️ Build a `TableDescriptor` from raw catalog rows.
///
/// Columns come back sorted by ordinal position no matter what order the catalog
/// gave them in. Columns whose type is in `unsupported_types` vanish from both the
/// export and the DDL. That's policy, not an error, so it's a `debug!` and not a `warn!`.
///
/// Returns `None` when nothing survives the filter. A table with no columns can't be
/// created in Redshift, and we'd rather skip it than fail the run over it.
pub fn describe_table(
    schema: &str,
    table_name: &str,
    mut columns: Vec<CatalogColumn>,
    unsupported_types: &[String],
) -> Option<TableDescriptor> {
    columns.sort_by_key(|c| c.ordinal_position);

    let described: Vec<ColumnDescriptor> = columns
        .iter()
        .filter(|column| {
            let unsupported = unsupported_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&column.data_type));
            if unsupported {
                debug!(
                    "🚫 dropping {}.{} ({}): Redshift and this type are not on speaking terms",
                    table_name, column.name, column.data_type
                );
            }
            !unsupported
        })
        .map(describe_column)
        .collect();

    if described.is_empty() {
        return None;
    }

    Some(TableDescriptor {
        schema: schema.to_string(),
        name: table_name.to_string(),
        target_name: target_table_name(table_name),
        columns: described,
    })
}

/// 🙈 Which catalog tables get replicated.
///
/// - `pg_*` tables: never. Those belong to Postgres, not to us.
/// - `skip_tables`: never. Someone decided, and we respect it.
/// - `only_tables`: if non-empty, only these. The CLI's `--table` flag.
///
/// Catalog order is preserved. That's the order the run will happen in.
pub fn select_tables(
    tables: Vec<CatalogTable>,
    skip_tables: &[String],
    only_tables: &[String],
) -> Vec<CatalogTable> {
    tables
        .into_iter()
        .filter(|table| !table.name.starts_with("pg_"))
        .filter(|table| !skip_tables.iter().any(|skip| *skip == table.name))
        .filter(|table| only_tables.is_empty() || only_tables.iter().any(|only| *only == table.name))
        .collect()
}
