//! Boolean AST of a metadata filter expression

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison in a leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    Eq,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => write!(f, "="),
        }
    }
}

/// `field=value` as typed by the user, not yet resolved against a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl Leaf {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Eq,
            value: value.into(),
        }
    }

    /// `field=?` asks for the allowed values instead of filtering
    pub fn is_value_query(&self) -> bool {
        self.value == "?"
    }
}

/// Parsed filter expression
///
/// The parser never produces an `And` or `Or` with fewer than two children
/// and never nests an `Or` inside an `And`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterNode {
    Leaf(Leaf),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
}

impl FilterNode {
    pub fn leaf(field: impl Into<String>, value: impl Into<String>) -> Self {
        FilterNode::Leaf(Leaf::new(field, value))
    }

    /// Leaves in left-to-right order
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
        match self {
            FilterNode::Leaf(leaf) => out.push(leaf),
            FilterNode::And(children) | FilterNode::Or(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, self.operator, self.value)
    }
}

/// Canonical text form, which parses back to the same tree
impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (children, separator) = match self {
            FilterNode::Leaf(leaf) => return write!(f, "{}", leaf),
            FilterNode::And(children) => (children, " & "),
            FilterNode::Or(children) => (children, " | "),
        };
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                f.write_str(separator)?;
            }
            write!(f, "{}", child)?;
        }
        Ok(())
    }
}
