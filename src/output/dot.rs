//! GraphViz DOT rendering: tables as record nodes, foreign keys as edges.

use std::fmt::Write;

use crate::schema::Realm;

pub fn render(realm: &Realm) -> String {
    let mut out = String::new();
    out.push_str("digraph schema {\n");
    out.push_str("    rankdir=LR;\n");
    out.push_str("    node [shape=record, fontsize=10];\n\n");

    for table in realm.tables.values() {
        let columns: Vec<String> = table
            .schema
            .columns
            .iter()
            .map(|c| {
                let marker = if table.schema.primary_key.contains(&c.name) {
                    "* "
                } else {
                    ""
                };
                format!("{}{}: {}", marker, c.name, escape(&c.sql_type))
            })
            .collect();
        let _ = writeln!(
            out,
            "    {} [label=\"{{{}|{}}}\"];",
            table.schema.name,
            table.schema.name,
            columns.join("\\l")
        );
    }

    out.push('\n');
    for fk in realm.all_foreign_keys() {
        let _ = writeln!(
            out,
            "    {} -> {} [label=\"{}\"];",
            fk.table_name,
            fk.referenced_table,
            fk.columns.join(", ")
        );
    }
    out.push_str("}\n");
    out
}

/// Escape characters that are structural in record labels.
fn escape(raw: &str) -> String {
    raw.replace('{', "\\{")
        .replace('}', "\\}")
        .replace('|', "\\|")
        .replace('<', "\\<")
        .replace('>', "\\>")
}
