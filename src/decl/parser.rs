//! Source-tree declaration parsing.
//!
//! Walks a package directory, parses every `.rs` file with `syn` and
//! collects the structs that carry schema annotations. Parsing is purely
//! syntactic: the sources never need to compile, and the `#[db]`/`#[dbdef]`
//! attributes are read as strings without macro resolution.
//!
//! A struct participates when at least one named field carries a `#[db]` or
//! `#[dbdef]` attribute. Fields of the unit type `()` are sentinels: their
//! `#[dbdef]` string holds the table-level annotation, and several sentinels
//! concatenate in declaration order.

use std::path::{Path, PathBuf};

use heck::ToSnakeCase;
use quote::ToTokens;
use syn::{Fields, Item, Type};
use walkdir::WalkDir;

use crate::decl::{FieldDecl, TableDecl};
use crate::error::{Error, Result};
use crate::tag::TagSet;

/// Parse every `.rs` file under `dir` and return all table declarations,
/// ordered by file path and declaration order within each file.
pub fn parse_package(dir: &Path) -> Result<Vec<TableDecl>> {
    if !dir.is_dir() {
        return Err(Error::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walk error"));
            Error::io(path, io)
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "rs")
        {
            files.push(entry.into_path());
        }
    }
    // Deterministic declaration order across runs.
    files.sort();

    let mut decls = Vec::new();
    for file in files {
        let source =
            std::fs::read_to_string(&file).map_err(|e| Error::io(&file, e))?;
        decls.extend(parse_source(&source, &file)?);
        tracing::debug!(file = %file.display(), "parsed source file");
    }
    Ok(decls)
}

/// Parse one source string. `path` is used for error reporting and recorded
/// on each declaration.
pub fn parse_source(source: &str, path: &Path) -> Result<Vec<TableDecl>> {
    let file = syn::parse_file(source).map_err(|e| Error::Parse {
        file: path.to_path_buf(),
        line: e.span().start().line,
        message: e.to_string(),
    })?;

    let mut decls = Vec::new();
    collect_items(&file.items, path, &mut decls)?;
    Ok(decls)
}

fn collect_items(items: &[Item], path: &Path, decls: &mut Vec<TableDecl>) -> Result<()> {
    for item in items {
        match item {
            Item::Struct(s) => {
                if let Some(decl) = struct_to_decl(s, path)? {
                    decls.push(decl);
                }
            }
            Item::Mod(m) => {
                if let Some((_, ref nested)) = m.content {
                    collect_items(nested, path, decls)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn struct_to_decl(item: &syn::ItemStruct, path: &Path) -> Result<Option<TableDecl>> {
    let Fields::Named(ref named) = item.fields else {
        return Ok(None);
    };

    let struct_name = item.ident.to_string();
    let mut fields = Vec::new();
    let mut table_tags = TagSet::default();
    let mut annotated = false;

    for field in &named.named {
        let Some(ref ident) = field.ident else { continue };
        let db = attr_string(field, "db", path)?;
        let dbdef = attr_string(field, "dbdef", path)?;
        if db.is_some() || dbdef.is_some() {
            annotated = true;
        }

        if is_unit_type(&field.ty) {
            // Sentinel: carries table-level tags, contributes no column.
            if let Some(raw) = dbdef {
                table_tags.extend(TagSet::parse(&raw));
            }
            continue;
        }

        let db_name = match db.as_deref() {
            Some("-") => continue,
            Some(name) => name.to_string(),
            None => ident.to_string().to_snake_case(),
        };

        fields.push(FieldDecl {
            name: ident.to_string(),
            db_name,
            rust_type: type_to_string(&field.ty),
            dbdef: dbdef.map(|raw| TagSet::parse(&raw)).unwrap_or_default(),
        });
    }

    if !annotated {
        return Ok(None);
    }

    let table_name = match table_tags.first("table") {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => pluralize(&struct_name.to_snake_case()),
    };

    Ok(Some(TableDecl {
        struct_name,
        table_name,
        fields,
        table_tags,
        source_file: path.to_path_buf(),
    }))
}

/// Read `#[name("...")]` off a field, if present.
fn attr_string(field: &syn::Field, name: &str, path: &Path) -> Result<Option<String>> {
    for attr in &field.attrs {
        if attr.path().is_ident(name) {
            let lit: syn::LitStr = attr.parse_args().map_err(|e| Error::Parse {
                file: path.to_path_buf(),
                line: e.span().start().line,
                message: format!("malformed #[{name}(...)] attribute: {e}"),
            })?;
            return Ok(Some(lit.value()));
        }
    }
    Ok(None)
}

fn is_unit_type(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(t) if t.elems.is_empty())
}

/// Render a type back to readable source form (`Option<String>` rather
/// than the token stream's `Option < String >`).
fn type_to_string(ty: &Type) -> String {
    let raw = ty.to_token_stream().to_string();
    raw.replace(" < ", "<")
        .replace(" > ", ">")
        .replace(" >", ">")
        .replace("< ", "<")
        .replace(" :: ", "::")
        .replace(" , ", ", ")
}

/// Snake-cased struct names become table names by appending `s`, unless
/// the name already ends in one.
fn pluralize(name: &str) -> String {
    if name.ends_with('s') {
        name.to_string()
    } else {
        format!("{name}s")
    }
}
