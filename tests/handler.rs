//! Filter handler integration tests
//!
//! Full registration / routing / extraction flows through the public API.
//!
//! Run with: cargo test --test handler

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use msgfilter::{
    AddFilterError, FilterDefinition, FilterHandler, GetResultsError, Identifier, MappingError,
    PairListBuilder, ResultOptions, StringListBuilder, ValidationError,
};

fn ids(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(fields) => fields,
        _ => panic!("args must be an object"),
    }
}

/// Filter pulling temperature into data and a sequence number into extra.
fn sensor_filter(id: &str, source: &str) -> FilterDefinition {
    FilterDefinition::new(
        id,
        source,
        [
            ("temperature:data", "payload.t"),
            ("seq:extra", "meta.seq"),
        ],
    )
}

fn sensor_message() -> Value {
    json!({"payload": {"t": 21.5}, "meta": {"seq": 7}})
}

#[test]
fn test_register_and_extract() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();

    let message = sensor_message();
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filter_ids, ids(&["f1"]));
    let extracted = results[0].extracted().unwrap();
    assert_eq!(extracted.data["temperature"], json!(21.5));
    assert_eq!(extracted.extra["seq"], json!(7));
}

#[test]
fn test_filters_sharing_a_mapping_table_share_one_result() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();
    handler.add_filter(sensor_filter("f2", "dev1")).unwrap();

    let message = sensor_message();
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filter_ids, ids(&["f1", "f2"]));

    // Dropping one owner must not take the shared configuration with it.
    handler.delete_filter("f1").unwrap();
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();
    assert_eq!(results[0].filter_ids, ids(&["f2"]));
}

#[test]
fn test_mapping_declaration_order_does_not_split_results() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();
    handler
        .add_filter(FilterDefinition::new(
            "f2",
            "dev1",
            [
                ("seq:extra", "meta.seq"),
                ("temperature:data", "payload.t"),
            ],
        ))
        .unwrap();

    let message = sensor_message();
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filter_ids, ids(&["f1", "f2"]));
}

#[test]
fn test_distinct_mapping_tables_yield_separate_results() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();
    handler
        .add_filter(FilterDefinition::new(
            "f2",
            "dev1",
            [("humidity:data", "payload.h")],
        ))
        .unwrap();

    let message = json!({"payload": {"t": 21.5, "h": 60}, "meta": {"seq": 7}});
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();

    assert_eq!(results.len(), 2);
    let all_ids: BTreeSet<String> = results
        .iter()
        .flat_map(|result| result.filter_ids.iter().cloned())
        .collect();
    assert_eq!(all_ids, ids(&["f1", "f2"]));
}

#[test]
fn test_one_failing_configuration_does_not_block_the_rest() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();
    handler
        .add_filter(FilterDefinition::new(
            "f2",
            "dev1",
            [("voltage:data", "payload.v")],
        ))
        .unwrap();

    let message = sensor_message();
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();

    assert_eq!(results.len(), 2);
    let failed: Vec<_> = results.iter().filter(|r| r.error().is_some()).collect();
    let succeeded: Vec<_> = results.iter().filter(|r| r.extracted().is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].filter_ids, ids(&["f2"]));
    assert_eq!(succeeded.len(), 1);
    assert_eq!(succeeded[0].filter_ids, ids(&["f1"]));
}

#[test]
fn test_identifiers_route_by_message_content() {
    let handler = FilterHandler::new();
    handler
        .add_filter(
            sensor_filter("f1", "dev1")
                .with_identifiers([Identifier::with_value("type", "sensor")]),
        )
        .unwrap();

    // No source hint: the identifier match alone routes the message.
    let message = json!({"type": "sensor", "payload": {"t": 19}, "meta": {"seq": 1}});
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new())
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filter_ids, ids(&["f1"]));
}

#[test]
fn test_wildcard_identifier_contributes_key_not_value() {
    let handler = FilterHandler::new();
    handler
        .add_filter(sensor_filter("f1", "dev1").with_identifiers([
            Identifier::with_value("type", "sensor"),
            Identifier::wildcard("unit"),
        ]))
        .unwrap();

    // Identity is the type value plus the literal key name "unit", so any
    // unit value routes to the same filter.
    for unit in ["C", "F"] {
        let message = json!({
            "type": "sensor",
            "unit": unit,
            "payload": {"t": 19},
            "meta": {"seq": 1}
        });
        let results: Vec<_> = handler
            .get_results(&message, ResultOptions::new())
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1, "unit {} failed to route", unit);
    }
}

#[test]
fn test_most_specific_identifier_record_wins() {
    let handler = FilterHandler::new();
    handler
        .add_filter(
            sensor_filter("broad", "dev1")
                .with_identifiers([Identifier::with_value("type", "sensor")]),
        )
        .unwrap();
    handler
        .add_filter(
            FilterDefinition::new("narrow", "dev1", [("humidity:data", "payload.h")])
                .with_identifiers([
                    Identifier::with_value("type", "sensor"),
                    Identifier::wildcard("channel"),
                ]),
        )
        .unwrap();

    let message = json!({
        "type": "sensor",
        "channel": 4,
        "payload": {"t": 19, "h": 60},
        "meta": {"seq": 1}
    });
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new())
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filter_ids, ids(&["narrow"]));
}

#[test]
fn test_source_fallback_when_no_identifier_matches() {
    let handler = FilterHandler::new();
    handler
        .add_filter(
            sensor_filter("f1", "dev1")
                .with_identifiers([Identifier::with_value("type", "sensor")]),
        )
        .unwrap();
    handler
        .add_filter(FilterDefinition::new(
            "f2",
            "dev2",
            [("raw:data", "payload.t")],
        ))
        .unwrap();

    // The message carries no "type" key, so classification fails and the
    // caller-provided source routes it instead.
    let message = json!({"payload": {"t": 3}});
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev2"))
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filter_ids, ids(&["f2"]));
}

#[test]
fn test_resolved_identity_does_not_fall_back_to_source() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();
    handler
        .add_filter(
            FilterDefinition::new("f2", "dev2", [("raw:data", "payload.t")])
                .with_identifiers([Identifier::with_value("type", "sensor")]),
        )
        .unwrap();

    // The record registered for "sensor" matches by key but the message's
    // own value "plug" is what routes, and nothing is registered for it.
    let message = json!({"type": "plug", "payload": {"t": 3}});
    let error = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap_err();

    assert_eq!(
        error,
        GetResultsError::NoFilter {
            identity: Some("plug".to_string())
        }
    );
}

#[test]
fn test_unrouted_message_errors() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();

    let message = json!({"payload": {"t": 3}});

    let no_key = handler
        .get_results(&message, ResultOptions::new())
        .unwrap_err();
    assert_eq!(no_key, GetResultsError::NoFilter { identity: None });

    let unknown = handler
        .get_results(&message, ResultOptions::new().with_source("dev9"))
        .unwrap_err();
    assert_eq!(
        unknown,
        GetResultsError::NoFilter {
            identity: Some("dev9".to_string())
        }
    );
    assert!(unknown.to_string().contains("dev9"));
}

#[test]
fn test_non_object_message_is_rejected() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();

    for message in [json!([1, 2, 3]), json!("text"), json!(null)] {
        let error = handler
            .get_results(&message, ResultOptions::new().with_source("dev1"))
            .unwrap_err();
        assert_eq!(error, GetResultsError::MessageIdentification);
    }
}

#[test]
fn test_missing_key_policies_per_group() {
    let handler = FilterHandler::new();
    handler
        .add_filter(FilterDefinition::new(
            "f1",
            "dev1",
            [
                ("temperature:data", "payload.t"),
                ("voltage:data", "payload.v"),
                ("seq:extra", "meta.seq"),
            ],
        ))
        .unwrap();

    let message = json!({"payload": {"t": 21}, "meta": {}});

    // Strict everywhere by default: the absent voltage fails the item.
    let strict: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();
    assert!(matches!(
        strict[0].error(),
        Some(MappingError::KeyMissing { .. })
    ));

    // Lenient data alone is not enough: the extra group still fails on
    // its own missing key.
    let extra_strict: Vec<_> = handler
        .get_results(
            &message,
            ResultOptions::new()
                .with_source("dev1")
                .with_data_ignore_missing(true),
        )
        .unwrap()
        .collect();
    assert!(matches!(
        extra_strict[0].error(),
        Some(MappingError::KeyMissing { path, .. }) if path == "meta.seq"
    ));

    // Lenient on both groups keeps whatever resolves.
    let lenient: Vec<_> = handler
        .get_results(
            &message,
            ResultOptions::new()
                .with_source("dev1")
                .with_data_ignore_missing(true)
                .with_extra_ignore_missing(true),
        )
        .unwrap()
        .collect();
    let extracted = lenient[0].extracted().unwrap();
    assert_eq!(extracted.data["temperature"], json!(21));
    assert!(!extracted.data.contains_key("voltage"));
    assert!(extracted.extra.is_empty());
}

#[test]
fn test_value_coercion_through_typed_mappings() {
    let handler = FilterHandler::new();
    handler
        .add_filter(FilterDefinition::new(
            "f1",
            "dev1",
            [
                ("temperature:int:data", "payload.t"),
                ("level:float:data", "payload.level"),
                ("id:string:data", "payload.id"),
                ("active:bool:extra", "payload.active"),
                ("raw:string_json:extra", "payload"),
            ],
        ))
        .unwrap();

    let message = json!({
        "payload": {"t": "21.7", "level": 3, "id": 99, "active": 0}
    });
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();

    let extracted = results[0].extracted().unwrap();
    assert_eq!(extracted.data["temperature"], json!(21));
    assert_eq!(extracted.data["level"], json!(3.0));
    assert_eq!(extracted.data["id"], json!("99"));
    assert_eq!(extracted.extra["active"], json!(false));
    let raw = extracted.extra["raw"].as_str().unwrap();
    let reparsed: Value = serde_json::from_str(raw).unwrap();
    assert_eq!(reparsed, message["payload"]);
}

#[test]
fn test_builders_selected_per_group() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();

    let message = sensor_message();
    let results: Vec<_> = handler
        .get_results(
            &message,
            ResultOptions::new()
                .with_source("dev1")
                .with_data_builder(StringListBuilder)
                .with_extra_builder(PairListBuilder),
        )
        .unwrap()
        .collect();

    let extracted = results[0].extracted().unwrap();
    assert_eq!(extracted.data, vec!["temperature=21.5"]);
    assert_eq!(extracted.extra, vec![("seq".to_string(), json!(7))]);
}

#[test]
fn test_replacing_a_filter_id_moves_its_route() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();
    handler.add_filter(sensor_filter("f1", "dev2")).unwrap();

    let message = sensor_message();
    let old_route = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap_err();
    assert_eq!(
        old_route,
        GetResultsError::NoFilter {
            identity: Some("dev1".to_string())
        }
    );

    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev2"))
        .unwrap()
        .collect();
    assert_eq!(results[0].filter_ids, ids(&["f1"]));
}

#[test]
fn test_delete_unknown_filter_is_an_error() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();

    let error = handler.delete_filter("ghost").unwrap_err();
    assert_eq!(error.id, "ghost");

    // The failed delete must not have disturbed the registered filter.
    let message = sensor_message();
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();
    assert_eq!(results.len(), 1);
}

#[test]
fn test_filter_args_roundtrip() {
    let handler = FilterHandler::new();
    handler
        .add_filter(
            sensor_filter("f1", "dev1").with_args(args(json!({"threshold": 5, "mode": "avg"}))),
        )
        .unwrap();
    handler.add_filter(sensor_filter("f2", "dev1")).unwrap();

    assert_eq!(
        handler.get_filter_args("f1").unwrap(),
        args(json!({"threshold": 5, "mode": "avg"}))
    );
    assert_eq!(handler.get_filter_args("f2").unwrap(), Map::new());
    assert_eq!(handler.get_filter_args("ghost").unwrap_err().id, "ghost");
}

#[test]
fn test_sources_reflect_live_registrations() {
    let handler = FilterHandler::new();
    assert!(handler.get_sources().is_empty());
    assert_eq!(handler.get_sources_timestamp(), None);

    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();
    handler.add_filter(sensor_filter("f2", "dev2")).unwrap();
    handler.add_filter(sensor_filter("f3", "dev2")).unwrap();

    assert_eq!(handler.get_sources(), ids(&["dev1", "dev2"]));
    let stamped = handler.get_sources_timestamp();
    assert!(stamped.is_some());

    handler.delete_filter("f2").unwrap();
    assert_eq!(handler.get_sources(), ids(&["dev1", "dev2"]));

    handler.delete_filter("f3").unwrap();
    assert_eq!(handler.get_sources(), ids(&["dev1"]));
    assert!(handler.get_sources_timestamp() >= stamped);
}

#[test]
fn test_invalid_definitions_are_rejected() {
    let handler = FilterHandler::new();

    let empty_id = FilterDefinition::new("", "dev1", [("temperature:data", "payload.t")]);
    assert_eq!(
        handler.add_filter(empty_id),
        Err(AddFilterError::Validation(ValidationError::EmptyId))
    );

    let bad_key = FilterDefinition::new("f1", "dev1", [("temperature", "payload.t")]);
    assert!(matches!(
        handler.add_filter(bad_key),
        Err(AddFilterError::ParseMappings(_))
    ));

    let bad_identifier = sensor_filter("f1", "dev1")
        .with_identifiers([Identifier::with_value("type", json!(["a"]))]);
    assert_eq!(
        handler.add_filter(bad_identifier),
        Err(AddFilterError::Validation(
            ValidationError::InvalidIdentifierValue {
                key: "type".to_string()
            }
        ))
    );

    assert!(handler.get_sources().is_empty());
}

#[test]
fn test_results_with_default_map_builder_are_json_ready() {
    let handler = FilterHandler::new();
    handler.add_filter(sensor_filter("f1", "dev1")).unwrap();

    let message = sensor_message();
    let results: Vec<_> = handler
        .get_results(&message, ResultOptions::new().with_source("dev1"))
        .unwrap()
        .collect();

    let extracted = results[0].extracted().unwrap();
    let encoded = serde_json::to_string(&extracted.data).unwrap();
    assert_eq!(encoded, r#"{"temperature":21.5}"#);
}
