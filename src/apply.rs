//! Transactional statement application.
//!
//! Scripts are split on `;` with awareness of single-quoted literals,
//! dollar-quoted bodies and SQL comments, then executed in order inside a
//! single transaction. The first failure rolls everything back and reports
//! the failing statement's index.

use tokio_postgres::Client;

use crate::error::{Error, Result};

/// Session statement timeout applied before the transaction begins.
const STATEMENT_TIMEOUT_SECS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub executed: usize,
}

/// Split a script into executable statements.
///
/// Semicolons inside `'…'` literals, `$tag$…$tag$` bodies, `--` line
/// comments and `/* … */` block comments do not split. Pieces that contain
/// only comments and whitespace (e.g. reverser warnings) are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = script.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                current.push(c);
                i += 1;
                while i < chars.len() {
                    current.push(chars[i]);
                    if chars[i] == '\'' {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            '$' => {
                if let Some(tag_len) = dollar_tag_len(&chars[i..]) {
                    let tag: String = chars[i..i + tag_len].iter().collect();
                    current.push_str(&tag);
                    i += tag_len;
                    // Copy until the matching closing tag.
                    while i < chars.len() {
                        if chars[i] == '$'
                            && chars[i..].len() >= tag_len
                            && chars[i..i + tag_len].iter().collect::<String>() == tag
                        {
                            current.push_str(&tag);
                            i += tag_len;
                            break;
                        }
                        current.push(chars[i]);
                        i += 1;
                    }
                } else {
                    current.push(c);
                    i += 1;
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                // Line comment: copy through end of line.
                while i < chars.len() && chars[i] != '\n' {
                    current.push(chars[i]);
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let mut depth = 0;
                while i < chars.len() {
                    if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                        depth += 1;
                        current.push_str("/*");
                        i += 2;
                    } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        depth -= 1;
                        current.push_str("*/");
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        current.push(chars[i]);
                        i += 1;
                    }
                }
            }
            ';' => {
                push_statement(&mut statements, &mut current);
                i += 1;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let stmt = current.trim();
    if !stmt.is_empty() && !is_comment_only(stmt) {
        statements.push(stmt.to_string());
    }
    current.clear();
}

/// Length of a dollar-quote opening tag (`$$`, `$body$`, …) starting at
/// `chars[0] == '$'`, or `None` if this `$` does not open one.
fn dollar_tag_len(chars: &[char]) -> Option<usize> {
    debug_assert_eq!(chars.first(), Some(&'$'));
    let mut j = 1;
    while j < chars.len() {
        let c = chars[j];
        if c == '$' {
            return Some(j + 1);
        }
        if !(c.is_alphanumeric() || c == '_') {
            return None;
        }
        j += 1;
    }
    None
}

/// True when a piece holds nothing but comments and whitespace.
fn is_comment_only(piece: &str) -> bool {
    let chars: Vec<char> = piece.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            let mut depth = 0;
            while i < chars.len() {
                if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                    depth += 1;
                    i += 2;
                } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    depth -= 1;
                    i += 2;
                    if depth == 0 {
                        break;
                    }
                } else {
                    i += 1;
                }
            }
        } else {
            return false;
        }
    }
    true
}

/// Execute a script in one transaction. On any failure the transaction is
/// rolled back and the failing statement index is reported.
pub async fn apply_script(client: &mut Client, script: &str) -> Result<ApplyReport> {
    let statements = split_statements(script);
    apply_statements(client, &statements).await
}

/// Execute pre-split statements in one transaction.
pub async fn apply_statements(client: &mut Client, statements: &[String]) -> Result<ApplyReport> {
    client
        .batch_execute(&format!(
            "SET statement_timeout = '{STATEMENT_TIMEOUT_SECS}s'"
        ))
        .await?;

    let tx = client.transaction().await?;
    for (stmt_index, stmt) in statements.iter().enumerate() {
        tracing::debug!(stmt_index, sql = %stmt, "executing statement");
        if let Err(source) = tx.batch_execute(stmt).await {
            // Dropping the transaction rolls it back.
            return Err(Error::Apply { stmt_index, source });
        }
    }
    tx.commit().await?;

    tracing::info!(executed = statements.len(), "migration applied");
    Ok(ApplyReport {
        executed: statements.len(),
    })
}
