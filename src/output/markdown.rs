//! Markdown rendering of a realm, one section per table.

use std::fmt::Write;

use crate::schema::{Realm, TableState};

pub fn render(realm: &Realm) -> String {
    let mut out = String::new();
    out.push_str("# Database schema\n");

    for table in realm.tables.values() {
        render_table(&mut out, table);
    }

    if !realm.views.is_empty() {
        out.push_str("\n## Views\n\n");
        for view in &realm.views {
            let _ = writeln!(out, "- `{view}`");
        }
    }
    if !realm.sequences.is_empty() {
        out.push_str("\n## Sequences\n\n");
        for seq in &realm.sequences {
            let _ = writeln!(out, "- `{seq}`");
        }
    }
    if !realm.enums.is_empty() {
        out.push_str("\n## Enum types\n\n");
        for e in &realm.enums {
            let _ = writeln!(out, "- `{}`: {}", e.name, e.variants.join(", "));
        }
    }
    out
}

fn render_table(out: &mut String, table: &TableState) {
    let _ = writeln!(out, "\n## {}\n", table.schema.name);
    out.push_str("| Column | Type | Nullable | Default |\n");
    out.push_str("|---|---|---|---|\n");
    for col in &table.schema.columns {
        let nullable = if col.not_null { "no" } else { "yes" };
        let default = col.default.as_deref().unwrap_or("");
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            col.name, col.sql_type, nullable, default
        );
    }

    let secondary: Vec<_> = table.indexes.iter().filter(|i| !i.is_primary).collect();
    if !table.schema.primary_key.is_empty() {
        let _ = writeln!(
            out,
            "\nPrimary key: `({})`",
            table.schema.primary_key.join(", ")
        );
    }
    if !secondary.is_empty() {
        out.push_str("\nIndexes:\n\n");
        for idx in secondary {
            let unique = if idx.is_unique { " (unique)" } else { "" };
            let partial = if idx.is_partial() {
                format!(" where `{}`", idx.where_clause)
            } else {
                String::new()
            };
            let _ = writeln!(
                out,
                "- `{}` on ({}){}{}",
                idx.name,
                idx.columns.join(", "),
                unique,
                partial
            );
        }
    }
    if !table.foreign_keys.is_empty() {
        out.push_str("\nForeign keys:\n\n");
        for fk in &table.foreign_keys {
            let _ = writeln!(
                out,
                "- `{}`: ({}) -> {} ({}) on delete {}, on update {}",
                fk.name,
                fk.columns.join(", "),
                fk.referenced_table,
                fk.referenced_columns.join(", "),
                fk.on_delete,
                fk.on_update
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_fixtures::sample_realm;

    #[test]
    fn test_markdown_sections() {
        let md = render(&sample_realm());
        assert!(md.contains("## users"));
        assert!(md.contains("| email | text | no |"));
        assert!(md.contains("Primary key: `(id)`"));
        assert!(md.contains("`users_email_key` on (email) (unique)"));
        assert!(md.contains("-> teams (id) on delete SET NULL"));
        assert!(md.contains("## Enum types"));
    }
}
