//! Predicate normalization and canonical signatures.
//!
//! A signature is the sole identity of an index or foreign key in the diff:
//! two semantically equivalent definitions must produce byte-identical
//! signatures, whatever their spelling. Predicates are canonicalized through
//! the PostgreSQL grammar (`pg_query`) when they parse, with a conservative
//! string pass as the fallback.

use crate::schema::FkAction;

/// Characters that make up comparison operators in the string fallback.
const OPERATOR_CHARS: &[char] = &['<', '>', '=', '!'];

/// Canonicalize a partial-index predicate. Empty input stays empty.
///
/// The parser path embeds the predicate in `SELECT 1 WHERE <p>`, deparses
/// the result and takes the text after `WHERE`. Anything the grammar
/// rejects goes through [`string_normalize_where`].
pub fn normalize_where(predicate: &str) -> String {
    let trimmed = predicate.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match parser_normalize_where(trimmed) {
        Some(normalized) => normalized,
        None => {
            tracing::debug!(predicate = trimmed, "predicate did not parse; using string fallback");
            string_normalize_where(trimmed)
        }
    }
}

fn parser_normalize_where(predicate: &str) -> Option<String> {
    let wrapped = format!("SELECT 1 WHERE {predicate}");
    let parsed = pg_query::parse(&wrapped).ok()?;
    let deparsed = pg_query::deparse(&parsed.protobuf).ok()?;
    let pos = deparsed.find(" WHERE ")?;
    let out = deparsed[pos + " WHERE ".len()..].trim();
    if out.is_empty() { None } else { Some(out.to_string()) }
}

/// String-level predicate canonicalization: strip redundant outer
/// parentheses, collapse whitespace, lowercase bare `TRUE`/`FALSE`, and
/// space comparison operators. Quoted literals pass through untouched.
pub fn string_normalize_where(predicate: &str) -> String {
    let stripped = strip_outer_parens(predicate.trim());
    let spaced = space_operators(&stripped);
    let collapsed = collapse_whitespace(&spaced);
    lowercase_bool_keywords(&collapsed)
}

/// Repeatedly remove one pair of outer parentheses while the remainder
/// stays balanced, so `((a = 1))` and `a = 1` compare equal.
fn strip_outer_parens(input: &str) -> String {
    let mut s = input.trim();
    loop {
        let bytes = s.as_bytes();
        if bytes.len() < 2 || bytes[0] != b'(' || bytes[bytes.len() - 1] != b')' {
            return s.to_string();
        }
        let inner = &s[1..s.len() - 1];
        if !is_balanced(inner) {
            return s.to_string();
        }
        s = inner.trim();
    }
}

/// Parenthesis balance check that ignores quoted content.
fn is_balanced(input: &str) -> bool {
    let mut depth: i32 = 0;
    let mut in_quote = false;
    for c in input.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_quote
}

/// Ensure exactly one space on each side of a maximal run of comparison
/// operator characters outside quoted literals.
fn space_operators(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut chars = input.chars().peekable();
    let mut in_quote = false;
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_quote = !in_quote;
            out.push(c);
            continue;
        }
        if !in_quote && OPERATOR_CHARS.contains(&c) {
            let mut run = String::from(c);
            while let Some(&next) = chars.peek() {
                if OPERATOR_CHARS.contains(&next) {
                    run.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if !out.ends_with(' ') {
                out.push(' ');
            }
            out.push_str(&run);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Collapse whitespace runs to single spaces outside quoted literals and
/// trim the ends.
fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_quote = false;
    let mut pending_space = false;
    for c in input.chars() {
        if c == '\'' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            in_quote = !in_quote;
            out.push(c);
            continue;
        }
        if in_quote {
            out.push(c);
        } else if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    out
}

/// Lowercase standalone `TRUE`/`FALSE` tokens outside quoted literals.
fn lowercase_bool_keywords(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut token = String::new();
    let mut in_quote = false;
    let flush = |token: &mut String, out: &mut String| {
        if token.eq_ignore_ascii_case("true") {
            out.push_str("true");
        } else if token.eq_ignore_ascii_case("false") {
            out.push_str("false");
        } else {
            out.push_str(token);
        }
        token.clear();
    };
    for c in input.chars() {
        if c == '\'' {
            flush(&mut token, &mut out);
            in_quote = !in_quote;
            out.push(c);
            continue;
        }
        if in_quote {
            out.push(c);
        } else if c.is_alphanumeric() || c == '_' {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            out.push(c);
        }
    }
    flush(&mut token, &mut out);
    out
}

/// Canonicalize an index method: trimmed, lowercased, defaulting to
/// `btree`.
pub fn normalize_method(method: &str) -> String {
    let m = method.trim().to_lowercase();
    if m.is_empty() { "btree".to_string() } else { m }
}

/// Canonicalize a column list entry: trimmed and lowercased. Order is
/// preserved by the caller; index column order is semantically relevant.
fn normalize_column(column: &str) -> String {
    column.trim().to_lowercase()
}

/// Canonical index identity.
///
/// `|`-joined pieces in fixed order, omitting `primary:`/`unique:` when
/// false and `where:` when empty:
/// `table:<t>|cols:<c1,c2,…>|primary:true|unique:true|method:<m>|where:<p>`
pub fn index_signature(
    table: &str,
    columns: &[String],
    is_unique: bool,
    is_primary: bool,
    method: &str,
    where_clause: &str,
) -> String {
    let cols: Vec<String> = columns.iter().map(|c| normalize_column(c)).collect();
    let mut pieces = vec![
        format!("table:{}", table.trim().to_lowercase()),
        format!("cols:{}", cols.join(",")),
    ];
    if is_primary {
        pieces.push("primary:true".to_string());
    }
    if is_unique {
        pieces.push("unique:true".to_string());
    }
    pieces.push(format!("method:{}", normalize_method(method)));
    let normalized_where = normalize_where(where_clause);
    if !normalized_where.is_empty() {
        pieces.push(format!("where:{normalized_where}"));
    }
    pieces.join("|")
}

/// Canonical foreign-key identity:
/// `table:<t>|cols:<…>|ref:<rt>|refcols:<…>|ondelete:<A>|onupdate:<A>`.
pub fn fk_signature(
    table: &str,
    columns: &[String],
    referenced_table: &str,
    referenced_columns: &[String],
    on_delete: FkAction,
    on_update: FkAction,
) -> String {
    let cols: Vec<String> = columns.iter().map(|c| normalize_column(c)).collect();
    let ref_cols: Vec<String> = referenced_columns.iter().map(|c| normalize_column(c)).collect();
    format!(
        "table:{}|cols:{}|ref:{}|refcols:{}|ondelete:{}|onupdate:{}",
        table.trim().to_lowercase(),
        cols.join(","),
        referenced_table.trim().to_lowercase(),
        ref_cols.join(","),
        on_delete,
        on_update,
    )
}
