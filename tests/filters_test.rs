//! Integration tests for pattern matching and the filter registries

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use relmodel::filters::identifiers::snake_to_camel;
use relmodel::filters::{ConfigurableFilters, Filters, IdentifiersFilters, Mappings, ValueFilters};
use relmodel::pattern::Pattern;
use relmodel::transform::Transform;
use relmodel::value::{Value, ValueType};
use relmodel::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;

fn lowercase() -> Transform<String> {
    Transform::new("lowercase", |s: String| Ok(s.to_lowercase()))
}

fn trim() -> Transform<String> {
    Transform::new("trim", |s: String| Ok(s.trim().to_string()))
}

proptest! {
    #[test]
    fn prop_star_matches_any_name(name in "[A-Za-z0-9_ $-]{0,24}") {
        let star = Pattern::compile("*", '.').unwrap();
        prop_assert!(star.matches(&name));
    }

    #[test]
    fn prop_literal_prefix_matches_case_insensitively(prefix in "[a-z]{1,8}", rest in "[a-z_]{0,8}") {
        let pattern = Pattern::compile(&format!("{}*", prefix.to_uppercase()), '.').unwrap();
        let name = format!("{}{}", prefix, rest);
        prop_assert!(pattern.matches(&name));
        let mismatched = format!("#{}", name);
        prop_assert!(!pattern.matches(&mismatched));
    }

    #[test]
    fn prop_infix_literals_must_align(head in "[a-z]{1,6}", tail in "[a-z]{1,6}", middle in "[a-z]{0,6}") {
        let pattern = Pattern::compile(&format!("{}*{}", head, tail), '.').unwrap();
        let aligned = format!("{}{}{}", head, middle, tail);
        prop_assert!(pattern.matches(&aligned));
        let truncated = format!("{}{}", head, &tail[..tail.len() - 1]);
        prop_assert!(!pattern.matches(&truncated));
    }

    #[test]
    fn prop_snake_to_camel_is_idempotent(name in "[A-Za-z]{1,8}(_[A-Za-z]{1,8}){0,3}") {
        let once = snake_to_camel(&name);
        prop_assert_eq!(snake_to_camel(&once), once.clone());
    }
}

#[test]
fn test_lowercase_twice_equals_lowercase() {
    let mut once: Filters<Transform<String>> = Filters::new();
    once.add_table_mapping("book*", lowercase()).unwrap();

    let mut twice: Filters<Transform<String>> = Filters::new();
    twice.add_table_mapping("*", lowercase()).unwrap();
    twice.add_table_mapping("book*", lowercase()).unwrap();

    for name in ["BookShelf", "BOOK", "book_author"] {
        assert_eq!(
            twice.get_table_filter(name).apply(name.to_string()).unwrap(),
            once.get_table_filter(name).apply(name.to_string()).unwrap()
        );
    }
}

#[test]
fn test_commuting_transforms_registration_order() {
    let mut forward: Filters<Transform<String>> = Filters::new();
    forward.add_column_mapping("*", "*_name", lowercase()).unwrap();
    forward.add_column_mapping("author", "*", trim()).unwrap();

    let mut backward: Filters<Transform<String>> = Filters::new();
    backward.add_column_mapping("author", "*", trim()).unwrap();
    backward.add_column_mapping("*", "*_name", lowercase()).unwrap();

    let input = "  Ursula K. Le GUIN ".to_string();
    assert_eq!(
        forward.get_column_filter("author", "last_name").apply(input.clone()).unwrap(),
        backward.get_column_filter("author", "last_name").apply(input).unwrap()
    );
}

#[test]
fn test_fold_order_broad_to_specific() {
    let mut filters: Filters<Transform<String>> = Filters::new();
    let suffix = |tag: &'static str| Transform::new(tag, move |s: String| Ok(format!("{}{}", s, tag)));
    filters.add_table_mapping("book", suffix("-exact")).unwrap();
    filters.add_table_mapping("*", suffix("-any")).unwrap();
    filters.add_table_mapping("bo*", suffix("-prefix")).unwrap();

    assert_eq!(
        filters.get_table_filter("book").names(),
        vec!["-any", "-prefix", "-exact"]
    );
    assert_eq!(
        filters.get_table_filter("book").apply("book".to_string()).unwrap(),
        "book-any-prefix-exact"
    );
}

#[test]
fn test_negative_token_cancels_positive() {
    let mut filters: ConfigurableFilters<String> = ConfigurableFilters::new("identifiers.mapping");
    filters.add_stock_filter("foo", Transform::new("foo", |s: String| Ok(format!("foo{}", s))));
    filters.add_mapping_str("*", "foo,-foo").unwrap();
    filters.add_mapping_str("book.*", "foo, -foo").unwrap();

    assert!(filters.get_table_filter("anything").is_identity());
    assert!(filters.get_column_filter("book", "title").is_identity());
}

#[test]
fn test_negative_token_across_patterns() {
    let mut identifiers = IdentifiersFilters::new();
    identifiers.add_mapping_str("*", "uppercase").unwrap();
    identifiers.add_mapping_str("log_*", "-uppercase").unwrap();

    assert_eq!(identifiers.transform_table_name("book").unwrap(), "BOOK");
    assert_eq!(identifiers.transform_table_name("log_entry").unwrap(), "log_entry");
}

#[test]
fn test_default_column_shortcut() {
    let mut filters: Filters<Transform<String>> = Filters::new();
    filters.add_column_mapping("*", "*", lowercase()).unwrap();

    assert_eq!(filters.get_default_column_filter().names(), vec!["lowercase"]);
    assert_eq!(
        filters.get_column_filter("ANY_TABLE", "ANY_COLUMN").names(),
        vec!["lowercase"]
    );

    let mut identifiers = IdentifiersFilters::new();
    identifiers
        .set_mapping(&Mappings::Flat("snake_to_camel".to_string()))
        .unwrap();
    assert_eq!(
        identifiers.transform_column_name_default("PUBLISHER_ID").unwrap(),
        "publisherId"
    );
    assert_eq!(
        identifiers.transform_column_name("book", "PUBLISHER_ID").unwrap(),
        "publisherId"
    );
}

#[test]
fn test_underscore_pattern_is_a_wildcard() {
    let mut identifiers = IdentifiersFilters::new();
    let mut map = indexmap::IndexMap::new();
    map.insert("_".to_string(), "lowercase".to_string());
    identifiers.set_mapping(&Mappings::Map(map)).unwrap();
    assert_eq!(identifiers.transform_table_name("BOOK").unwrap(), "book");
}

#[test]
fn test_mapping_key_with_two_dots_is_rejected() {
    let mut identifiers = IdentifiersFilters::new();
    let err = identifiers
        .add_mapping_str("public.book.title", "lowercase")
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMappingKey { .. }));
    assert!(err.to_string().contains("public.book.title"));
}

#[test]
fn test_unknown_transform_token() {
    let mut identifiers = IdentifiersFilters::new();
    let err = identifiers.add_mapping_str("*", "lowercase, frobnicate").unwrap_err();
    assert_eq!(
        err,
        ConfigError::UnknownTransform {
            prefix: "identifiers.mapping".to_string(),
            token: "frobnicate".to_string(),
        }
    );
}

#[test]
fn test_type_dispatch_path_compression() {
    let mut filters = ValueFilters::new("filters.read");
    filters.add_mapping_str("type:number", "mask").unwrap();

    assert_eq!(filters.filter(Value::Int(42)).unwrap(), Value::Null);
    assert_eq!(filters.hierarchy_walks(), 1);

    for _ in 0..100 {
        assert_eq!(filters.filter(Value::Int(7)).unwrap(), Value::Null);
    }
    assert_eq!(filters.hierarchy_walks(), 1);

    assert_eq!(filters.type_filter(ValueType::Float).names(), vec!["mask"]);
    assert_eq!(filters.hierarchy_walks(), 2);
    assert_eq!(filters.filter(Value::from("text")).unwrap(), Value::from("text"));
}

#[test]
fn test_unknown_value_type_key() {
    let mut filters = ValueFilters::new("filters.write");
    assert!(matches!(
        filters.add_mapping_str("type:money", "mask"),
        Err(ConfigError::UnknownValueType { .. })
    ));
}

#[test]
fn test_regex_rule_idempotence() {
    let mut identifiers = IdentifiersFilters::new();
    identifiers.add_mapping_str("*", "/^tbl_//").unwrap();
    let once = identifiers.transform_table_name("tbl_book").unwrap();
    assert_eq!(once, "book");
    assert_eq!(identifiers.transform_table_name(&once).unwrap(), once);

    let mut doubling = IdentifiersFilters::new();
    doubling.add_mapping_str("*", "/x/xx/").unwrap();
    let once = doubling.transform_table_name("box").unwrap();
    assert_eq!(once, "boxx");
    assert_ne!(doubling.transform_table_name(&once).unwrap(), once);
}

#[test]
fn test_lookup_and_plugin_tokens() {
    let mut identifiers = IdentifiersFilters::new();
    let mut names = HashMap::new();
    names.insert("t_pub".to_string(), "publisher".to_string());
    identifiers.register_lookup("legacy_names", Arc::new(names));
    identifiers.register_plugin("reverse", || {
        Ok(Transform::new("reverse", |s: String| Ok(s.chars().rev().collect())))
    });
    identifiers.add_mapping_str("t_*", "legacy_names").unwrap();
    identifiers.add_mapping_str("x_*", "reverse").unwrap();

    assert_eq!(identifiers.transform_table_name("t_pub").unwrap(), "publisher");
    assert_eq!(identifiers.transform_table_name("t_other").unwrap(), "t_other");
    assert_eq!(identifiers.transform_table_name("x_ab").unwrap(), "ba_x");
}

#[test]
fn test_obfuscation_requires_cryptograph() {
    let mut filters = ValueFilters::new("filters.read");
    filters.add_mapping_str("user.id", "obfuscate").unwrap();
    assert!(filters.needs_cryptograph());
    assert!(!filters.has_cryptograph());

    let obfuscate = filters.get_column_filter("user", "id");
    assert!(obfuscate.requires_secret());
    assert!(obfuscate.apply(Value::Int(12)).is_err());

    filters.set_cryptograph_class("aes-gcm", None).unwrap();
    let hidden = obfuscate.apply(Value::Int(12)).unwrap();
    assert_ne!(hidden, Value::Int(12));
    let shown = filters.resolve("deobfuscate").unwrap().apply(hidden).unwrap();
    assert_eq!(shown.to_string(), "12");
}
