// Property-based tests for execute request decoding and response shape

use common::errors::{FailureClass, QueryError};
use common::models::{Direction, ExecuteRequest, ExecuteResponse, Operator};
use proptest::prelude::*;
use serde_json::{json, Value};

fn operator_strategy() -> impl Strategy<Value = (&'static str, Operator)> {
    prop_oneof![
        Just(("=", Operator::Eq)),
        Just(("!=", Operator::Ne)),
        Just((">", Operator::Gt)),
        Just((">=", Operator::Gte)),
        Just(("<", Operator::Lt)),
        Just(("<=", Operator::Lte)),
        Just(("like", Operator::Like)),
        Just(("not like", Operator::NotLike)),
    ]
}

// Camel-case and snake-case paging keys decode identically
#[test]
fn property_1_paging_key_aliases() {
    proptest!(|(page_index in any::<i64>(), page_limit in any::<i64>())| {
        let camel = json!({"pageIndex": page_index, "pageLimit": page_limit}).to_string();
        let snake = json!({"page_index": page_index, "page_limit": page_limit}).to_string();

        let camel = ExecuteRequest::from_slice(camel.as_bytes()).unwrap();
        let snake = ExecuteRequest::from_slice(snake.as_bytes()).unwrap();

        prop_assert_eq!(&camel, &snake);
        prop_assert_eq!(camel.page_index, page_index);
        prop_assert_eq!(camel.page_limit, page_limit);
    });
}

// Scalar comparison filters keep attribute, operator and value
#[test]
fn property_2_scalar_filters_decode() {
    proptest!(|(
        attr in "[a-z]{1,8}(\\.[a-z]{1,8})?",
        (op_text, op) in operator_strategy(),
        value in prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,16}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ]
    )| {
        let body = json!({"filters": [{"attr": attr, "op": op_text, "val": value}]}).to_string();
        let request = ExecuteRequest::from_slice(body.as_bytes()).unwrap();

        prop_assert_eq!(request.filters.len(), 1);
        prop_assert_eq!(&request.filters[0].attr, &attr);
        prop_assert_eq!(request.filters[0].op, op);
        prop_assert_eq!(&request.filters[0].val, &value);
    });
}

// Membership filters need a non-empty array of scalars
#[test]
fn property_3_membership_filters_require_arrays() {
    proptest!(|(items in prop::collection::vec(any::<i32>(), 0..6), scalar in any::<i32>())| {
        let body = json!({"filters": [{"attr": "id", "op": "in", "val": items}]}).to_string();
        let decoded = ExecuteRequest::from_slice(body.as_bytes());
        prop_assert_eq!(decoded.is_ok(), !items.is_empty());

        let body = json!({"filters": [{"attr": "id", "op": "not in", "val": scalar}]}).to_string();
        prop_assert!(ExecuteRequest::from_slice(body.as_bytes()).is_err());
    });
}

// Sort terms decode from one- or two-element arrays
#[test]
fn property_4_sort_terms_decode() {
    proptest!(|(field in "[a-z_]{1,12}", direction in "[a-zA-Z]{0,5}", with_direction in any::<bool>())| {
        let term = if with_direction { json!([field, direction]) } else { json!([field]) };
        let body = json!({"sorts": [term]}).to_string();
        let request = ExecuteRequest::from_slice(body.as_bytes()).unwrap();

        let expected = if with_direction && direction.eq_ignore_ascii_case("asc") {
            Direction::Asc
        } else {
            Direction::Desc
        };
        prop_assert_eq!(&request.sorts[0].field, &field);
        prop_assert_eq!(request.sorts[0].direction, expected);
    });
}

// Whitespace-only bodies are the empty request
#[test]
fn property_5_blank_body_is_default_request() {
    proptest!(|(body in "[ \t\r\n]{0,12}")| {
        let request = ExecuteRequest::from_slice(body.as_bytes()).unwrap();
        prop_assert_eq!(request, ExecuteRequest::default());
    });
}

// Absent subjects are omitted from the response body; `sql` is always present
#[test]
fn property_6_response_shape() {
    proptest!(|(total in proptest::option::of(any::<i64>()), rows in proptest::option::of(0usize..4))| {
        let response = ExecuteResponse {
            total,
            data: rows.map(|n| {
                (0..n)
                    .map(|i| {
                        let mut row = serde_json::Map::new();
                        row.insert("id".to_string(), json!(i));
                        row
                    })
                    .collect()
            }),
            exec_time: "1.2ms".to_string(),
            ..Default::default()
        };
        let body = serde_json::to_value(&response).unwrap();

        prop_assert_eq!(body.get("total").is_some(), total.is_some());
        prop_assert_eq!(body.get("data").is_some(), rows.is_some());
        prop_assert_eq!(&body["sql"], &json!({}));
        prop_assert_eq!(&body["exec_time"], &json!("1.2ms"));
    });
}

// Only execution failures carry the statement text
#[test]
fn property_7_only_execution_failures_carry_sql() {
    proptest!(|(message in "[a-z ]{1,20}", sql in "SELECT [a-z]{1,10}")| {
        let failures = vec![
            QueryError::TemplateNotFound(message.clone()),
            QueryError::RequestDecodeFailed(message.clone()),
            QueryError::TokenResolutionFailed(message.clone()),
            QueryError::ExecutionFailed {
                subject: "data".to_string(),
                message: message.clone(),
                sql: sql.clone(),
            },
        ];

        for failure in &failures {
            let carries_sql = failure.class() == FailureClass::Execution;
            prop_assert_eq!(failure.sql().is_some(), carries_sql);
        }
        prop_assert_eq!(failures[3].sql(), Some(sql.as_str()));
    });
}
