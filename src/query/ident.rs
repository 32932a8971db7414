//! SQL identifier quoting
//!
//! Table and column names are never spliced into statement text as-is. They go
//! through [`quote_ident`], which wraps the name in double quotes and doubles any
//! embedded double quote, so the engine always reads the whole string as one
//! identifier. Values are bound as parameters and never pass through here.

use crate::error::{PipelineError, Result};

/// Quote `name` as a SQL identifier.
///
/// Blank names and names containing NUL are rejected.
pub fn quote_ident(name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(PipelineError::InvalidParameter(
            "identifier must not be blank".to_string(),
        ));
    }
    quote_column_name(name)
}

/// Quote a column name taken from a file header.
///
/// Unlike [`quote_ident`], a blank name is allowed and becomes `""`, which the
/// engine accepts as a column name. Only NUL is rejected.
pub fn quote_column_name(name: &str) -> Result<String> {
    if name.contains('\0') {
        return Err(PipelineError::InvalidParameter(format!(
            "identifier contains NUL: {:?}",
            name
        )));
    }

    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for ch in name.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    Ok(quoted)
}
