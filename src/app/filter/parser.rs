//! Filter expression parser
//!
//! Grammar, `&` binding tighter than `|`, no parentheses:
//!
//! ```text
//! expr   := term ('|' term)*
//! term   := factor ('&' factor)*
//! factor := field '=' value
//! ```
//!
//! Fields and values are trimmed and stripped of surrounding quotes. The value
//! is everything after the first `=`.

use super::ast::{FilterNode, Leaf};
use crate::errors::{FilterError, FilterResult};

/// Parse a filter expression such as `camera=L & camera_resol=6 | DOWNLOAD_AVAILABLE=Y`
///
/// # Errors
///
/// Returns `FilterError::InvalidSyntax` for a blank expression, an empty operand
/// around `&` or `|`, a factor without `=`, or an empty field or value.
pub fn parse(expression: &str) -> FilterResult<FilterNode> {
    if expression.trim().is_empty() {
        return Err(syntax_error(expression, "expression is empty"));
    }

    let mut terms = expression
        .split('|')
        .map(|term| parse_term(expression, term))
        .collect::<FilterResult<Vec<_>>>()?;

    Ok(if terms.len() == 1 {
        terms.remove(0)
    } else {
        FilterNode::Or(terms)
    })
}

fn parse_term(expression: &str, term: &str) -> FilterResult<FilterNode> {
    if term.trim().is_empty() {
        return Err(syntax_error(expression, "empty operand around '|'"));
    }

    let mut factors = term
        .split('&')
        .map(|factor| parse_factor(expression, factor))
        .collect::<FilterResult<Vec<_>>>()?;

    Ok(if factors.len() == 1 {
        factors.remove(0)
    } else {
        FilterNode::And(factors)
    })
}

fn parse_factor(expression: &str, factor: &str) -> FilterResult<FilterNode> {
    if factor.trim().is_empty() {
        return Err(syntax_error(expression, "empty operand around '&'"));
    }

    let (field, value) = factor.split_once('=').ok_or_else(|| {
        syntax_error(
            expression,
            &format!("'{}' is not of the form field=value", factor.trim()),
        )
    })?;

    let field = clean_token(field);
    let value = clean_token(value);
    if field.is_empty() {
        return Err(syntax_error(
            expression,
            &format!("missing field name in '{}'", factor.trim()),
        ));
    }
    if value.is_empty() {
        return Err(syntax_error(
            expression,
            &format!("missing value in '{}'", factor.trim()),
        ));
    }

    Ok(FilterNode::Leaf(Leaf::new(field, value)))
}

fn clean_token(token: &str) -> String {
    token
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn syntax_error(expression: &str, reason: &str) -> FilterError {
    FilterError::InvalidSyntax {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}
