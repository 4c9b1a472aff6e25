//! Resolution of a parsed filter against a dataset schema
//!
//! Field tokens resolve by exact filter id, then case-insensitive label, then
//! case-insensitive sql name. The first tier with any match wins; two matches
//! in the winning tier is an ambiguity error. `Select` values resolve by
//! case-insensitive value id, then label.

use serde::{Deserialize, Serialize};

use super::ast::{FilterNode, Leaf};
use crate::app::models::{FilterKind, FilterValue, MetadataFilter};
use crate::app::suggest::SuggestionEngine;
use crate::errors::{FilterError, FilterResult};

/// Service-shaped metadata filter tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "filterType", rename_all = "camelCase")]
pub enum CompiledQuery {
    Value {
        #[serde(rename = "filterId")]
        filter_id: String,
        value: String,
        operand: Operand,
    },
    Between {
        #[serde(rename = "filterId")]
        filter_id: String,
        #[serde(rename = "firstValue")]
        first_value: String,
        #[serde(rename = "secondValue")]
        second_value: String,
    },
    And {
        #[serde(rename = "childFilters")]
        child_filters: Vec<CompiledQuery>,
    },
    Or {
        #[serde(rename = "childFilters")]
        child_filters: Vec<CompiledQuery>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    Like,
}

impl CompiledQuery {
    /// Filter ids referenced anywhere in the tree
    pub fn filter_ids(&self) -> Vec<&str> {
        match self {
            CompiledQuery::Value { filter_id, .. } | CompiledQuery::Between { filter_id, .. } => {
                vec![filter_id.as_str()]
            }
            CompiledQuery::And { child_filters } | CompiledQuery::Or { child_filters } => {
                child_filters.iter().flat_map(|c| c.filter_ids()).collect()
            }
        }
    }
}

/// Allowed values of a filter, returned for `field=?`
#[derive(Debug, Clone, PartialEq)]
pub struct ValueListing {
    pub filter: MetadataFilter,
    pub values: Vec<FilterValue>,
}

/// Result of compiling an expression
#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutcome {
    Query(CompiledQuery),
    /// The expression asked for a value listing; no search should run
    ValueListing(ValueListing),
}

/// Compiles filter ASTs against one dataset's filter schema
#[derive(Debug, Clone)]
pub struct FilterCompiler<'a> {
    schema: &'a [MetadataFilter],
    suggestions: SuggestionEngine,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(schema: &'a [MetadataFilter]) -> Self {
        Self {
            schema,
            suggestions: SuggestionEngine::default(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: SuggestionEngine) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Compile `node`, or return the listing for the first `field=?` leaf
    ///
    /// Fields are resolved left to right, so an unknown field before the `?`
    /// leaf is still reported as an error.
    pub fn compile(&self, node: &FilterNode) -> FilterResult<CompileOutcome> {
        for leaf in node.leaves() {
            let filter = self.resolve_field(&leaf.field)?;
            if leaf.is_value_query() {
                return Ok(CompileOutcome::ValueListing(ValueListing {
                    filter: filter.clone(),
                    values: filter.values.clone(),
                }));
            }
        }

        self.compile_node(node).map(CompileOutcome::Query)
    }

    fn compile_node(&self, node: &FilterNode) -> FilterResult<CompiledQuery> {
        match node {
            FilterNode::Leaf(leaf) => self.compile_leaf(leaf),
            FilterNode::And(children) => Ok(CompiledQuery::And {
                child_filters: self.compile_children(children)?,
            }),
            FilterNode::Or(children) => Ok(CompiledQuery::Or {
                child_filters: self.compile_children(children)?,
            }),
        }
    }

    fn compile_children(&self, children: &[FilterNode]) -> FilterResult<Vec<CompiledQuery>> {
        children.iter().map(|c| self.compile_node(c)).collect()
    }

    fn compile_leaf(&self, leaf: &Leaf) -> FilterResult<CompiledQuery> {
        let filter = self.resolve_field(&leaf.field)?;

        match filter.kind {
            FilterKind::Select => {
                let value = self.resolve_value(filter, &leaf.value)?;
                Ok(like(filter, value.id.clone()))
            }
            FilterKind::Range => match leaf.value.split_once("..") {
                Some((low, high)) => {
                    let (low, high) = (low.trim(), high.trim());
                    if low.is_empty() || high.is_empty() {
                        return Err(FilterError::InvalidSyntax {
                            expression: leaf.to_string(),
                            reason: "range values must be written lo..hi".to_string(),
                        });
                    }
                    Ok(CompiledQuery::Between {
                        filter_id: filter.id.clone(),
                        first_value: low.to_string(),
                        second_value: high.to_string(),
                    })
                }
                None => Ok(like(filter, leaf.value.clone())),
            },
            FilterKind::Value => Ok(like(filter, leaf.value.clone())),
        }
    }

    /// Resolve a field token to exactly one filter of the schema
    pub fn resolve_field(&self, token: &str) -> FilterResult<&'a MetadataFilter> {
        let lowered = token.to_lowercase();
        let tiers: [&dyn Fn(&MetadataFilter) -> bool; 3] = [
            &|f: &MetadataFilter| f.id == token,
            &|f: &MetadataFilter| f.label.to_lowercase() == lowered,
            &|f: &MetadataFilter| !f.sql_name.is_empty() && f.sql_name.to_lowercase() == lowered,
        ];

        for tier in tiers {
            let matches: Vec<&'a MetadataFilter> =
                self.schema.iter().filter(|f| tier(*f)).collect();
            match matches.as_slice() {
                [] => continue,
                [single] => return Ok(*single),
                many => {
                    return Err(FilterError::AmbiguousField {
                        field: token.to_string(),
                        candidates: many.iter().map(|f| describe_field(f)).collect(),
                    })
                }
            }
        }

        let suggestions = self
            .suggestions
            .rank_by(token, self.schema, |f| {
                vec![f.id.as_str(), f.label.as_str(), f.sql_name.as_str()]
            })
            .into_iter()
            .map(|index| describe_field(&self.schema[index]))
            .collect();

        Err(FilterError::UnknownField {
            field: token.to_string(),
            available: self.schema.iter().map(describe_field).collect(),
            suggestions,
        })
    }

    /// Resolve a value token against the enumerated values of a `Select` filter
    pub fn resolve_value<'f>(
        &self,
        filter: &'f MetadataFilter,
        token: &str,
    ) -> FilterResult<&'f FilterValue> {
        let lowered = token.to_lowercase();
        let by_id = filter.values.iter().find(|v| v.id.to_lowercase() == lowered);
        let by_label = || filter.values.iter().find(|v| v.label.to_lowercase() == lowered);

        if let Some(value) = by_id.or_else(by_label) {
            return Ok(value);
        }

        let suggestions = self
            .suggestions
            .rank_by(token, &filter.values, |v| vec![v.id.as_str(), v.label.as_str()])
            .into_iter()
            .map(|index| {
                let v = &filter.values[index];
                format!("{} ({})", v.id, v.label)
            })
            .collect();

        Err(FilterError::UnknownValue {
            field: filter.label.clone(),
            value: token.to_string(),
            available: filter.value_descriptions(),
            suggestions,
        })
    }
}

fn like(filter: &MetadataFilter, value: String) -> CompiledQuery {
    CompiledQuery::Value {
        filter_id: filter.id.clone(),
        value,
        operand: Operand::Like,
    }
}

fn describe_field(filter: &MetadataFilter) -> String {
    if filter.sql_name.is_empty() {
        format!("{} ({})", filter.label, filter.id)
    } else {
        format!("{} ({}, {})", filter.label, filter.sql_name, filter.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::filter::parse;
    use serde_json::json;

    fn schema() -> Vec<MetadataFilter> {
        vec![
            MetadataFilter {
                id: "5e839ff8cfa94807".to_string(),
                label: "Camera Type".to_string(),
                sql_name: "CAMERA".to_string(),
                kind: FilterKind::Select,
                values: vec![
                    FilterValue {
                        id: "H".to_string(),
                        label: "KH-9 Higher Resolution Mapping Camera".to_string(),
                    },
                    FilterValue {
                        id: "L".to_string(),
                        label: "KH-9 Lower Resolution Mapping Camera".to_string(),
                    },
                ],
            },
            MetadataFilter {
                id: "5e839ff8388465fa".to_string(),
                label: "Camera Resolution".to_string(),
                sql_name: "CAMERA_RESOL".to_string(),
                kind: FilterKind::Select,
                values: vec![FilterValue {
                    id: "6".to_string(),
                    label: "2 to 4 feet".to_string(),
                }],
            },
            MetadataFilter {
                id: "5e839ff7d71d4811".to_string(),
                label: "Entity ID".to_string(),
                sql_name: "ENTITY_ID".to_string(),
                kind: FilterKind::Value,
                values: vec![],
            },
            MetadataFilter {
                id: "5e839ff8ba3b0c84".to_string(),
                label: "Frame Number".to_string(),
                sql_name: "FRAME_NUM".to_string(),
                kind: FilterKind::Range,
                values: vec![],
            },
        ]
    }

    fn compile(expression: &str) -> FilterResult<CompileOutcome> {
        let schema = schema();
        let node = parse(expression)?;
        FilterCompiler::new(&schema).compile(&node)
    }

    fn query(expression: &str) -> CompiledQuery {
        match compile(expression).unwrap() {
            CompileOutcome::Query(query) => query,
            other => panic!("expected a query, got {:?}", other),
        }
    }

    #[test]
    fn test_equivalent_forms_compile_identically() {
        let expected = query("5e839ff8cfa94807=L");
        assert_eq!(query("Camera Type=KH-9 Lower Resolution Mapping Camera"), expected);
        assert_eq!(query("camera=l"), expected);
        assert_eq!(query("'CAMERA' = \"L\""), expected);
        assert_eq!(
            expected,
            CompiledQuery::Value {
                filter_id: "5e839ff8cfa94807".to_string(),
                value: "L".to_string(),
                operand: Operand::Like,
            }
        );
    }

    #[test]
    fn test_precedence_preserved() {
        let compiled = query("camera=H & camera_resol=6 | entity_id=DZB1216");
        let CompiledQuery::Or { child_filters } = compiled else {
            panic!("expected OR at the root");
        };
        assert_eq!(child_filters.len(), 2);
        assert!(matches!(&child_filters[0], CompiledQuery::And { child_filters } if child_filters.len() == 2));
        assert!(matches!(&child_filters[1], CompiledQuery::Value { value, .. } if value == "DZB1216"));
    }

    #[test]
    fn test_wire_shape() {
        let compiled = query("camera=H & frame_num=10..20");
        assert_eq!(
            serde_json::to_value(&compiled).unwrap(),
            json!({
                "filterType": "and",
                "childFilters": [
                    {"filterType": "value", "filterId": "5e839ff8cfa94807", "value": "H", "operand": "like"},
                    {"filterType": "between", "filterId": "5e839ff8ba3b0c84", "firstValue": "10", "secondValue": "20"}
                ]
            })
        );
    }

    #[test]
    fn test_range_without_dots_is_like() {
        let compiled = query("Frame Number=12");
        assert!(matches!(compiled, CompiledQuery::Value { value, .. } if value == "12"));
        assert!(matches!(
            compile("frame_num=10.."),
            Err(FilterError::InvalidSyntax { .. })
        ));
    }

    #[test]
    fn test_unknown_field_lists_fields_and_ranks_suggestions() {
        let err = compile("camra=L").unwrap_err();
        let FilterError::UnknownField {
            field,
            available,
            suggestions,
        } = err
        else {
            panic!("expected unknown field");
        };
        assert_eq!(field, "camra");
        assert_eq!(available.len(), 4);
        assert!(suggestions.len() <= 50);
        assert!(suggestions[0].starts_with("Camera Type"));
    }

    #[test]
    fn test_unknown_value_lists_values() {
        let err = compile("camera=X").unwrap_err();
        let FilterError::UnknownValue {
            value,
            available,
            suggestions,
            ..
        } = err
        else {
            panic!("expected unknown value");
        };
        assert_eq!(value, "X");
        assert_eq!(
            available,
            vec![
                "H (KH-9 Higher Resolution Mapping Camera)",
                "L (KH-9 Lower Resolution Mapping Camera)"
            ]
        );
        assert_eq!(suggestions.len(), 2);
    }

    #[test]
    fn test_value_listing() {
        let outcome = compile("camera_resol=6 & camera=?").unwrap();
        let CompileOutcome::ValueListing(listing) = outcome else {
            panic!("expected a listing");
        };
        assert_eq!(listing.filter.id, "5e839ff8cfa94807");
        assert_eq!(listing.values.len(), 2);

        // Listing for a free-form field is empty, not an error
        let outcome = compile("entity_id=?").unwrap();
        assert!(matches!(outcome, CompileOutcome::ValueListing(l) if l.values.is_empty()));
    }

    #[test]
    fn test_unknown_field_before_listing_still_errors() {
        assert!(matches!(
            compile("nope=1 & camera=?"),
            Err(FilterError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_ambiguous_label() {
        let mut schema = schema();
        schema.push(MetadataFilter {
            id: "dup".to_string(),
            label: "camera type".to_string(),
            sql_name: "CAMERA_TYPE_2".to_string(),
            kind: FilterKind::Value,
            values: vec![],
        });
        let node = parse("Camera Type=L").unwrap();
        let err = FilterCompiler::new(&schema).compile(&node).unwrap_err();
        assert!(matches!(err, FilterError::AmbiguousField { candidates, .. } if candidates.len() == 2));

        // An exact id still wins over the ambiguous label tier
        let node = parse("dup=anything").unwrap();
        assert!(FilterCompiler::new(&schema).compile(&node).is_ok());
    }

    #[test]
    fn test_compiled_ids_exist_in_schema() {
        let schema = schema();
        let compiled = query("camera=H & camera_resol=6 | entity_id=x | frame_num=1..2");
        for id in compiled.filter_ids() {
            assert!(schema.iter().any(|f| f.id == id));
        }
    }
}
