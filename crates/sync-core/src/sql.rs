//! SQL text helpers for the MySQL/TiDB target dialect.

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `schema`.`table`
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Render a text value as a string literal, or `NULL` for `None`.
pub fn quote_literal(value: Option<&str>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(v) => {
            let mut out = String::with_capacity(v.len() + 2);
            out.push('\'');
            for ch in v.chars() {
                match ch {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    '\0' => out.push_str("\\0"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    other => out.push(other),
                }
            }
            out.push('\'');
            out
        }
    }
}
