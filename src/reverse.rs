//! Statement reversal.
//!
//! Maps one forward DDL statement to its inverse where one is derivable
//! from the statement text alone. Statements are parsed with `pg_query`;
//! anything that fails to parse, or whose inverse needs information the
//! statement does not carry (`DROP TABLE`, `DROP COLUMN`, …), yields a
//! warning comment the applier skips.

use pg_query::NodeEnum;

/// Reverse a single DDL statement. Returns the inverse statement and
/// whether it was derivable; non-derivable inputs produce a `--` comment.
pub fn reverse_statement(sql: &str) -> (String, bool) {
    let trimmed = sql.trim().trim_end_matches(';');
    if trimmed.is_empty() {
        return (String::new(), false);
    }

    let parsed = match pg_query::parse(trimmed) {
        Ok(p) => p,
        Err(_) => return warning(trimmed, "statement did not parse"),
    };
    let Some(node) = parsed
        .protobuf
        .stmts
        .first()
        .and_then(|s| s.stmt.as_ref())
        .and_then(|s| s.node.as_ref())
    else {
        return warning(trimmed, "statement did not parse");
    };

    match node {
        NodeEnum::CreateStmt(create) => match relation_name(create.relation.as_ref()) {
            Some(name) => derived(format!("DROP TABLE IF EXISTS {name} CASCADE")),
            None => warning(trimmed, "statement did not parse"),
        },
        NodeEnum::IndexStmt(index) => {
            if index.idxname.is_empty() {
                warning(trimmed, "index has no explicit name")
            } else {
                derived(format!("DROP INDEX IF EXISTS {}", index.idxname))
            }
        }
        NodeEnum::AlterTableStmt(alter) => reverse_alter_table(alter, trimmed),
        NodeEnum::RenameStmt(rename) => reverse_rename(rename, trimmed),
        NodeEnum::CreateSeqStmt(seq) => match relation_name(seq.sequence.as_ref()) {
            Some(name) => derived(format!("DROP SEQUENCE IF EXISTS {name} CASCADE")),
            None => warning(trimmed, "statement did not parse"),
        },
        NodeEnum::CreateEnumStmt(create) => {
            let name = dotted_name(&create.type_name);
            if name.is_empty() {
                warning(trimmed, "statement did not parse")
            } else {
                derived(format!("DROP TYPE IF EXISTS {name} CASCADE"))
            }
        }
        NodeEnum::CompositeTypeStmt(create) => match relation_name(create.typevar.as_ref()) {
            Some(name) => derived(format!("DROP TYPE IF EXISTS {name} CASCADE")),
            None => warning(trimmed, "statement did not parse"),
        },
        NodeEnum::CreateFunctionStmt(create) => {
            let name = dotted_name(&create.funcname);
            if name.is_empty() {
                warning(trimmed, "statement did not parse")
            } else {
                derived(format!("DROP FUNCTION IF EXISTS {name} CASCADE"))
            }
        }
        NodeEnum::CreateTrigStmt(trig) => match relation_name(trig.relation.as_ref()) {
            Some(table) if !trig.trigname.is_empty() => derived(format!(
                "DROP TRIGGER IF EXISTS {} ON {table} CASCADE",
                trig.trigname
            )),
            _ => warning(trimmed, "statement did not parse"),
        },
        NodeEnum::ViewStmt(view) => match relation_name(view.view.as_ref()) {
            Some(name) => derived(format!("DROP VIEW IF EXISTS {name} CASCADE")),
            None => warning(trimmed, "statement did not parse"),
        },
        NodeEnum::DropStmt(_) => warning(trimmed, "cannot reverse without the original schema"),
        _ => warning(trimmed, "no derivable inverse"),
    }
}

fn reverse_alter_table(
    alter: &pg_query::protobuf::AlterTableStmt,
    raw: &str,
) -> (String, bool) {
    let Some(table) = relation_name(alter.relation.as_ref()) else {
        return warning(raw, "statement did not parse");
    };

    // Only single-command statements have a mechanical inverse; mixed
    // command lists would need partial reversal.
    if alter.cmds.len() != 1 {
        return warning(raw, "multi-command ALTER TABLE");
    }
    let Some(NodeEnum::AlterTableCmd(cmd)) = alter.cmds[0].node.as_ref() else {
        return warning(raw, "statement did not parse");
    };

    match cmd.subtype() {
        pg_query::protobuf::AlterTableType::AtAddColumn => {
            let column = cmd.def.as_ref().and_then(|d| d.node.as_ref()).and_then(|n| match n {
                NodeEnum::ColumnDef(col) => Some(col.colname.clone()),
                _ => None,
            });
            match column {
                Some(col) => derived(format!("ALTER TABLE {table} DROP COLUMN IF EXISTS {col}")),
                None => warning(raw, "statement did not parse"),
            }
        }
        pg_query::protobuf::AlterTableType::AtAddConstraint => {
            let name = cmd.def.as_ref().and_then(|d| d.node.as_ref()).and_then(|n| match n {
                NodeEnum::Constraint(con) if !con.conname.is_empty() => Some(con.conname.clone()),
                _ => None,
            });
            match name {
                Some(name) => {
                    derived(format!("ALTER TABLE {table} DROP CONSTRAINT IF EXISTS {name}"))
                }
                None => warning(raw, "constraint has no explicit name"),
            }
        }
        pg_query::protobuf::AlterTableType::AtDropColumn => {
            warning(raw, "cannot reverse without the original schema")
        }
        pg_query::protobuf::AlterTableType::AtDropConstraint => {
            warning(raw, "cannot reverse without the original schema")
        }
        _ => warning(raw, "no derivable inverse"),
    }
}

fn reverse_rename(rename: &pg_query::protobuf::RenameStmt, raw: &str) -> (String, bool) {
    match rename.rename_type() {
        pg_query::protobuf::ObjectType::ObjectTable => {
            let Some(old) = relation_name(rename.relation.as_ref()) else {
                return warning(raw, "statement did not parse");
            };
            derived(format!("ALTER TABLE {} RENAME TO {}", rename.newname, old))
        }
        pg_query::protobuf::ObjectType::ObjectColumn => {
            let Some(table) = relation_name(rename.relation.as_ref()) else {
                return warning(raw, "statement did not parse");
            };
            derived(format!(
                "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                rename.newname, rename.subname
            ))
        }
        _ => warning(raw, "no derivable inverse"),
    }
}

fn derived(sql: String) -> (String, bool) {
    (sql, true)
}

/// Build the warning comment for a non-derivable statement. Single line,
/// so the applier's splitter treats it as empty.
fn warning(sql: &str, reason: &str) -> (String, bool) {
    let head: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let head = if head.len() > 80 {
        let mut end = 80;
        while !head.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &head[..end])
    } else {
        head
    };
    (format!("-- WARNING: {reason}; edit manually: {head}"), false)
}

fn relation_name(rv: Option<&pg_query::protobuf::RangeVar>) -> Option<String> {
    let rv = rv?;
    if rv.relname.is_empty() {
        return None;
    }
    if rv.schemaname.is_empty() {
        Some(rv.relname.clone())
    } else {
        Some(format!("{}.{}", rv.schemaname, rv.relname))
    }
}

fn dotted_name(parts: &[pg_query::protobuf::Node]) -> String {
    parts
        .iter()
        .filter_map(|n| match n.node.as_ref() {
            Some(NodeEnum::String(s)) => Some(s.sval.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}
