// crates/acstore-core/tests/filter.rs
// ============================================================================
// Module: Filter Expression Tests
// Description: Tests for filter parsing, evaluation, and SQL rendering.
// Purpose: Validate grammar rules, limits, and parameter binding.
// Dependencies: acstore-core, proptest
// ============================================================================
//! ## Overview
//! Exercises the filter grammar (literals, comparisons, boolean operators,
//! grouping), its size and nesting limits, in-memory evaluation, and the
//! parameterised SQL rendering used by database stores.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use acstore_core::AttributeContainer;
use acstore_core::AttributeValue;
use acstore_core::FilterError;
use acstore_core::FilterExpression;
use acstore_core::filter::CompareOp;
use acstore_core::filter::FilterLiteral;
use acstore_core::filter::FilterNode;
use acstore_core::filter::FilterOperand;
use acstore_core::filter::MAX_FILTER_INPUT_BYTES;
use acstore_core::filter::MAX_FILTER_NESTING;
use acstore_core::filter::SqlParameter;
use proptest::prelude::*;

/// Builds a container used as evaluation input.
fn sample_container() -> AttributeContainer {
    let mut container = AttributeContainer::new("event_data");
    container.set_attribute("parser", "winreg");
    container.set_attribute("pid", 4_i64);
    container.set_attribute("is_system", true);
    container.set_attribute("note", "");
    container
}

/// Parses and evaluates an expression against the sample container.
fn eval(expression: &str) -> Result<bool, FilterError> {
    FilterExpression::parse(expression)?.evaluate(&sample_container())
}

#[test]
fn parses_comparison_into_tree() {
    let expression = FilterExpression::parse("parser == 'winreg'").unwrap();
    assert_eq!(
        expression.root(),
        &FilterNode::Compare {
            left: FilterOperand::Attribute("parser".to_string()),
            op: CompareOp::Eq,
            right: FilterOperand::Literal(FilterLiteral::Str("winreg".to_string())),
        }
    );
    assert_eq!(expression.as_str(), "parser == 'winreg'");
}

#[test]
fn parses_literals_and_escapes() {
    let expression = FilterExpression::parse(r#"a == "it\"s" or b != -12 or c == True"#).unwrap();
    let FilterNode::Or(parts) = expression.root() else {
        panic!("expected or node");
    };
    assert_eq!(parts.len(), 3);
    assert_eq!(
        parts[0],
        FilterNode::Compare {
            left: FilterOperand::Attribute("a".to_string()),
            op: CompareOp::Eq,
            right: FilterOperand::Literal(FilterLiteral::Str("it\"s".to_string())),
        }
    );
    assert_eq!(
        parts[1],
        FilterNode::Compare {
            left: FilterOperand::Attribute("b".to_string()),
            op: CompareOp::NotEq,
            right: FilterOperand::Literal(FilterLiteral::Int(-12)),
        }
    );
    assert_eq!(expression.attribute_names(), vec!["a", "b", "c"]);
}

#[test]
fn precedence_is_not_then_and_then_or() {
    let expression = FilterExpression::parse("not a or b and c").unwrap();
    let FilterNode::Or(parts) = expression.root() else {
        panic!("expected or node");
    };
    assert!(matches!(parts[0], FilterNode::Not(_)));
    assert!(matches!(parts[1], FilterNode::And(_)));
}

#[test]
fn evaluates_comparisons_and_boolean_logic() {
    assert!(eval("parser == 'winreg'").unwrap());
    assert!(!eval("parser != 'winreg'").unwrap());
    assert!(eval("pid == 4 and is_system == True").unwrap());
    assert!(eval("pid == 5 or (parser == 'winreg' and not pid == 3)").unwrap());
    assert!(eval("is_system == 1").unwrap());
    assert!(!eval("pid == '4'").unwrap());
    assert!(eval("is_system").unwrap());
    assert!(!eval("note").unwrap());
    assert!(eval("'a' == 'a'").unwrap());
}

#[test]
fn evaluation_of_unknown_attribute_is_an_error() {
    assert_eq!(eval("missing == 1"), Err(FilterError::UnknownAttribute("missing".to_string())));
    assert!(eval("parser == 'winreg' or missing == 1").unwrap());
    assert!(!eval("parser == 'other' and missing == 1").unwrap());
}

#[test]
fn composite_values_compare_structurally() {
    let mut container = AttributeContainer::new("event_tag");
    container.set_attribute("labels", AttributeValue::List(vec![AttributeValue::from("x")]));
    container.set_attribute("copy", AttributeValue::List(vec![AttributeValue::from("x")]));
    let expression = FilterExpression::parse("labels == copy and labels != 'x'").unwrap();
    assert!(expression.evaluate(&container).unwrap());
}

#[test]
fn syntax_errors_are_reported() {
    assert_eq!(FilterExpression::parse("   "), Err(FilterError::EmptyInput));
    assert!(matches!(
        FilterExpression::parse("a == 'open"),
        Err(FilterError::UnterminatedString { position: 5 })
    ));
    assert!(matches!(
        FilterExpression::parse("a == 1 == 2"),
        Err(FilterError::ChainedComparison { .. })
    ));
    assert!(matches!(FilterExpression::parse("a = 1"), Err(FilterError::UnexpectedToken { .. })));
    assert!(matches!(FilterExpression::parse("(a == 1"), Err(FilterError::UnexpectedToken { .. })));
    assert!(matches!(FilterExpression::parse("a == 1)"), Err(FilterError::UnexpectedToken { .. })));
    assert!(matches!(FilterExpression::parse("a and"), Err(FilterError::UnexpectedToken { .. })));
    assert!(matches!(FilterExpression::parse("a == -"), Err(FilterError::InvalidNumber { .. })));
    assert!(matches!(
        FilterExpression::parse("a == 99999999999999999999"),
        Err(FilterError::InvalidNumber { .. })
    ));
    assert!(matches!(FilterExpression::parse("a < 1"), Err(FilterError::UnexpectedToken { .. })));
}

#[test]
fn input_limits_are_enforced() {
    let oversized = format!("a == '{}'", "x".repeat(MAX_FILTER_INPUT_BYTES));
    assert!(matches!(FilterExpression::parse(&oversized), Err(FilterError::InputTooLarge { .. })));

    let allowed = format!("{}a{}", "(".repeat(MAX_FILTER_NESTING), ")".repeat(MAX_FILTER_NESTING));
    assert!(FilterExpression::parse(&allowed).is_ok());

    let nested =
        format!("{}a{}", "(".repeat(MAX_FILTER_NESTING + 1), ")".repeat(MAX_FILTER_NESTING + 1));
    assert!(matches!(FilterExpression::parse(&nested), Err(FilterError::NestingTooDeep { .. })));

    let negated = format!("{}a", "not ".repeat(MAX_FILTER_NESTING + 1));
    assert!(matches!(FilterExpression::parse(&negated), Err(FilterError::NestingTooDeep { .. })));
}

#[test]
fn renders_parameterised_sql() {
    let expression =
        FilterExpression::parse("parser == 'winreg' and (pid != 4 or not is_system == False)")
            .unwrap();
    let sql = expression.to_sql(|name| ["parser", "pid", "is_system"].contains(&name)).unwrap();
    assert_eq!(sql.clause, "(\"parser\" = ? AND (\"pid\" <> ? OR NOT (\"is_system\" = ?)))");
    assert_eq!(
        sql.parameters,
        vec![
            SqlParameter::Text("winreg".to_string()),
            SqlParameter::Integer(4),
            SqlParameter::Integer(0),
        ]
    );
}

#[test]
fn bare_operands_render_as_truth_tests() {
    let expression = FilterExpression::parse("not parser and 'x' and not ''").unwrap();
    let sql = expression.to_sql(|name| name == "parser").unwrap();
    assert_eq!(
        sql.clause,
        "(NOT ((CASE typeof(\"parser\") WHEN 'text' THEN \"parser\" <> '' \
         WHEN 'blob' THEN length(\"parser\") > 0 ELSE \"parser\" <> 0 END)) AND 1 AND NOT (0))"
    );
    assert!(sql.parameters.is_empty());
    assert_eq!(
        FilterExpression::parse("secret").unwrap().to_sql(|name| name == "parser"),
        Err(FilterError::UnknownAttribute("secret".to_string()))
    );
}

#[test]
fn sql_rendering_rejects_unknown_columns() {
    let expression = FilterExpression::parse("parser == 'x' or secret == 1").unwrap();
    assert_eq!(
        expression.to_sql(|name| name == "parser"),
        Err(FilterError::UnknownAttribute("secret".to_string()))
    );
}

proptest! {
    #[test]
    fn string_literals_round_trip_through_escaping(value in "[ -~]{0,40}") {
        let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
        let expression = FilterExpression::parse(&format!("name == '{escaped}'")).unwrap();
        let sql = expression.to_sql(|name| name == "name").unwrap();
        prop_assert_eq!(sql.parameters, vec![SqlParameter::Text(value)]);
    }

    #[test]
    fn integer_literals_round_trip(value in any::<i64>()) {
        let expression = FilterExpression::parse(&format!("n == {value}")).unwrap();
        let sql = expression.to_sql(|name| name == "n").unwrap();
        prop_assert_eq!(sql.parameters, vec![SqlParameter::Integer(value)]);
    }

    #[test]
    fn arbitrary_input_never_panics(input in "\\PC{0,64}") {
        let _ = FilterExpression::parse(&input);
    }
}
