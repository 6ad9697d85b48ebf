//! Reverse engineering of an in-memory bookshelf schema

use pretty_assertions::assert_eq;
use relmodel::config::EntityDecl;
use relmodel::filters::crypto::AesCryptograph;
use relmodel::filters::{Mappings, ValueFilters};
use relmodel::metadata::{ColumnInfo, InMemoryMetadata};
use relmodel::model::{AttributeKind, AttributeOrigin, DriverInfo, Model, PlaceholderStyle, ReverseMode};
use relmodel::{ConfigError, ModelError, TransformError, Value};
use std::sync::Arc;

/// publisher 1-n book n-n author, the n-n side through author_book.
fn bookshelf() -> InMemoryMetadata {
    InMemoryMetadata::new()
        .table(
            "publisher",
            vec![
                ColumnInfo::new("publisher_id", "serial").generated(),
                ColumnInfo::new("name", "varchar").size(120),
            ],
        )
        .primary_key("publisher", &["publisher_id"])
        .table(
            "author",
            vec![
                ColumnInfo::new("author_id", "serial").generated(),
                ColumnInfo::new("name", "varchar").size(120),
            ],
        )
        .primary_key("author", &["author_id"])
        .table(
            "book",
            vec![
                ColumnInfo::new("book_id", "serial").generated(),
                ColumnInfo::new("title", "text"),
                ColumnInfo::new("publisher_id", "int4"),
                ColumnInfo::new("status", "book_status").enumeration(),
            ],
        )
        .primary_key("book", &["book_id"])
        .enum_values("book", "status", &["draft", "published"])
        .table(
            "author_book",
            vec![
                ColumnInfo::new("author_id", "int4"),
                ColumnInfo::new("book_id", "int4"),
            ],
        )
        .primary_key("author_book", &["author_id", "book_id"])
        .foreign_key("book", &["publisher_id"], "publisher")
        .foreign_key("author_book", &["author_id"], "author")
        .foreign_key("author_book", &["book_id"], "book")
}

fn model(mode: ReverseMode) -> Model {
    let mut model = Model::new("bookshelf");
    model.set_reverse_mode(mode);
    model
}

#[test]
fn test_full_mode_discovers_entities_and_joins() {
    let model = model(ReverseMode::Full);
    let mut metadata = bookshelf();
    let schema = model.initialize(&mut metadata).unwrap();

    let mut names: Vec<&str> = schema.entities().map(|e| e.name()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["author", "author_book", "book", "publisher"]);

    let book = schema.entity("book").unwrap();
    let publisher = book.attribute("publisher").unwrap();
    assert_eq!(publisher.kind, AttributeKind::Row);
    assert_eq!(publisher.origin, AttributeOrigin::Upstream);
    assert_eq!(publisher.result_entity.as_deref(), Some("publisher"));
    assert_eq!(
        publisher.query.to_string(),
        "SELECT * FROM publisher WHERE publisher_id = <publisher_id>"
    );

    let books = schema.entity("publisher").unwrap().attribute("books").unwrap();
    assert_eq!(books.kind, AttributeKind::Rowset);
    assert_eq!(books.origin, AttributeOrigin::Downstream);
    assert_eq!(books.result_entity.as_deref(), Some("book"));
    assert_eq!(
        books.query.to_string(),
        "SELECT * FROM book WHERE publisher_id = <publisher_id>"
    );

    let link = schema.entity("author_book").unwrap();
    assert!(link.has_attribute("author"));
    assert!(link.has_attribute("book"));
    assert!(schema.entity("author").unwrap().has_attribute("author_books"));

    // many-to-many joins need the extended mode
    assert!(!schema.entity("author").unwrap().has_attribute("books"));
    assert_eq!(
        book.column("status").unwrap().enum_values(),
        Some(&["draft".to_string(), "published".to_string()][..])
    );
}

#[test]
fn test_extended_mode_links_through_junction_table() {
    let model = model(ReverseMode::Extended);
    let mut metadata = bookshelf();
    let schema = model.initialize(&mut metadata).unwrap();

    let books = schema.entity("author").unwrap().attribute("books").unwrap();
    assert_eq!(books.origin, AttributeOrigin::ExtendedJoin);
    assert_eq!(books.kind, AttributeKind::Rowset);
    assert_eq!(books.result_entity.as_deref(), Some("book"));
    assert_eq!(
        books.query.to_string(),
        "SELECT book.* FROM author_book JOIN book ON book.book_id = author_book.book_id \
         WHERE author_id = <author_id>"
    );

    let authors = schema.entity("book").unwrap().attribute("authors").unwrap();
    assert_eq!(authors.origin, AttributeOrigin::ExtendedJoin);
    assert_eq!(authors.result_entity.as_deref(), Some("author"));
}

#[test]
fn test_junction_name_must_combine_both_entities() {
    let mut metadata = InMemoryMetadata::new()
        .table("author", vec![ColumnInfo::new("author_id", "serial")])
        .primary_key("author", &["author_id"])
        .table("book", vec![ColumnInfo::new("book_id", "serial")])
        .primary_key("book", &["book_id"])
        .table(
            "credit",
            vec![ColumnInfo::new("author_id", "int4"), ColumnInfo::new("book_id", "int4")],
        )
        .foreign_key("credit", &["author_id"], "author")
        .foreign_key("credit", &["book_id"], "book");

    let model = model(ReverseMode::Extended);
    let schema = model.initialize(&mut metadata).unwrap();
    assert!(schema.entity("author").unwrap().has_attribute("credits"));
    assert!(!schema.entity("author").unwrap().has_attribute("books"));
    assert!(!schema.entity("book").unwrap().has_attribute("authors"));
}

#[test]
fn test_explicit_attribute_wins_over_join() {
    let mut model = model(ReverseMode::Extended);
    model
        .declare_entity(EntityDecl::new("book").attribute(
            "publisher",
            AttributeKind::Row,
            Some("publisher"),
            "SELECT * FROM publisher WHERE publisher_id = <publisher_id> AND active",
        ))
        .unwrap();
    model
        .declare_entity(EntityDecl::new("author").attribute(
            "books",
            AttributeKind::Scalar,
            None,
            "SELECT COUNT(*) FROM author_book WHERE author_id = <author_id>",
        ))
        .unwrap();

    let mut metadata = bookshelf();
    let schema = model.initialize(&mut metadata).unwrap();

    let publisher = schema.entity("book").unwrap().attribute("publisher").unwrap();
    assert!(publisher.is_declared());
    assert!(publisher.query.to_string().ends_with("AND active"));

    let books = schema.entity("author").unwrap().attribute("books").unwrap();
    assert!(books.is_declared());
    assert_eq!(books.kind, AttributeKind::Scalar);

    // the other side of the junction is still generated
    let authors = schema.entity("book").unwrap().attribute("authors").unwrap();
    assert_eq!(authors.origin, AttributeOrigin::ExtendedJoin);
}

#[test]
fn test_missing_explicit_table_is_an_error() {
    let mut model = model(ReverseMode::Full);
    model
        .declare_entity(EntityDecl::new("archive").table("nonexistent_table"))
        .unwrap();
    let mut metadata = bookshelf();
    let err = model.initialize(&mut metadata).unwrap_err();
    assert_eq!(
        err,
        ModelError::Config(ConfigError::MissingTable {
            entity: "archive".to_string(),
            table: "nonexistent_table".to_string(),
        })
    );
    assert!(err.is_configuration());
}

#[test]
fn test_missing_implicit_table_is_unbound() {
    let mut model = model(ReverseMode::Full);
    model.declare_entity(EntityDecl::new("archive")).unwrap();
    let mut metadata = bookshelf();
    let schema = model.initialize(&mut metadata).unwrap();

    let archive = schema.entity("archive").unwrap();
    assert_eq!(archive.table(), None);
    assert_eq!(archive.column_count(), 0);
    assert!(archive.iterate_attribute().is_none());
    assert!(schema.entity_for_table("archive").is_none());
}

#[test]
fn test_tables_shared_by_two_entities() {
    let mut model = model(ReverseMode::Columns);
    model.declare_entity(EntityDecl::new("book").table("book")).unwrap();
    model.declare_entity(EntityDecl::new("novel").table("book")).unwrap();
    let mut metadata = bookshelf();
    assert!(matches!(
        model.initialize(&mut metadata),
        Err(ModelError::Config(ConfigError::SharedTable { .. }))
    ));
}

#[test]
fn test_explicit_table_is_never_rebound() {
    let mut model = model(ReverseMode::Tables);
    model
        .declare_entity(EntityDecl::new("book").table("author_book"))
        .unwrap();
    let mut metadata = bookshelf();
    assert!(matches!(
        model.initialize(&mut metadata),
        Err(ModelError::Config(ConfigError::TableRebind { .. }))
    ));
}

#[test]
fn test_columns_mode_keeps_declared_entities_only() {
    let mut model = model(ReverseMode::Columns);
    model.declare_entity(EntityDecl::new("book")).unwrap();
    let mut metadata = bookshelf();
    let schema = model.initialize(&mut metadata).unwrap();

    assert_eq!(schema.len(), 1);
    let book = schema.entity("book").unwrap();
    assert_eq!(book.column_count(), 4);
    assert!(book.column("book_id").unwrap().is_key_column());
    assert!(!book.has_attribute("publisher"));
    assert_eq!(
        book.fetch_attribute().unwrap().query.to_string(),
        "SELECT * FROM book WHERE book_id = <book_id>"
    );
}

#[test]
fn test_joins_mode_without_table_discovery() {
    let mut model = model(ReverseMode::Joins);
    model.declare_entity(EntityDecl::new("book")).unwrap();
    model.declare_entity(EntityDecl::new("publisher")).unwrap();
    let mut metadata = bookshelf();
    let schema = model.initialize(&mut metadata).unwrap();

    assert_eq!(schema.len(), 2);
    assert!(schema.entity("author").is_none());
    assert!(schema.entity("book").unwrap().has_attribute("publisher"));
    assert!(schema.entity("publisher").unwrap().has_attribute("books"));
}

#[test]
fn test_unresolved_primary_key_fails_join_inference() {
    let mut model = model(ReverseMode::Full);
    model
        .declare_entity(EntityDecl::new("publisher").primary_key(&["publisher_code"]))
        .unwrap();
    let mut metadata = bookshelf();
    let err = model.initialize(&mut metadata).unwrap_err();
    assert!(matches!(
        err,
        ModelError::Config(ConfigError::UnresolvedPrimaryKey { ref entity, .. }) if entity == "publisher"
    ));
}

#[test]
fn test_composite_foreign_key_to_unresolved_key_fails() {
    let mut model = model(ReverseMode::Full);
    model
        .declare_entity(EntityDecl::new("edition").primary_key(&["edition_code", "printing"]))
        .unwrap();
    let mut metadata = InMemoryMetadata::new()
        .table(
            "edition",
            vec![ColumnInfo::new("isbn", "varchar"), ColumnInfo::new("printing", "int4")],
        )
        .primary_key("edition", &["isbn", "printing"])
        .table(
            "copy",
            vec![
                ColumnInfo::new("copy_id", "serial").generated(),
                ColumnInfo::new("isbn", "varchar"),
                ColumnInfo::new("printing", "int4"),
            ],
        )
        .primary_key("copy", &["copy_id"])
        .foreign_key("copy", &["isbn", "printing"], "edition");

    let err = model.initialize(&mut metadata).unwrap_err();
    assert!(matches!(
        err,
        ModelError::Config(ConfigError::UnresolvedPrimaryKey { ref entity, .. }) if entity == "edition"
    ));
}

#[test]
fn test_metadata_is_read_in_one_busy_pass() {
    let model = model(ReverseMode::Extended);
    let mut metadata = bookshelf();
    model.initialize(&mut metadata).unwrap();

    assert!(!metadata.is_busy());
    assert_eq!(metadata.busy_passes(), 1);
    assert_eq!(metadata.idle_calls(), 0);
    assert!(metadata.calls() > 0);
}

#[test]
fn test_failed_initialization_is_cached() {
    let model = model(ReverseMode::Full);
    let mut metadata = bookshelf().failing_on("book");
    let first = model.initialize(&mut metadata).unwrap_err();
    assert!(matches!(first, ModelError::Metadata(_)));
    assert!(!metadata.is_busy());

    let calls = metadata.calls();
    let mut healthy = bookshelf();
    assert_eq!(model.initialize(&mut healthy).unwrap_err(), first);
    assert_eq!(healthy.calls(), 0);
    assert_eq!(metadata.calls(), calls);
    assert_eq!(model.schema().unwrap_err(), first);
    assert!(!model.is_initialized());
}

#[test]
fn test_identifier_mapping_shapes_attribute_names() {
    let mut model = model(ReverseMode::Full);
    model
        .identifiers_mut()
        .set_mapping(&Mappings::Flat("*.*=snake_to_camel".to_string()))
        .unwrap();
    let mut metadata = bookshelf();
    let schema = model.initialize(&mut metadata).unwrap();

    let book = schema.entity("book").unwrap();
    assert!(book.has_column("publisherId"));
    assert_eq!(book.column("publisherId").unwrap().sql_name, "publisher_id");
    assert_eq!(
        book.attribute("publisher").unwrap().query.parameters(),
        vec!["publisherId"]
    );
    assert_eq!(
        schema.entity("publisher").unwrap().attribute("books").unwrap().query.parameters(),
        vec!["publisherId"]
    );
}

#[test]
fn test_postgresql_rendering() {
    let mut model = model(ReverseMode::Full);
    model.set_driver(DriverInfo::for_tag("postgresql"));
    let mut metadata = bookshelf().table("pg_stat_activity", vec![ColumnInfo::new("pid", "int4")]);
    let schema = model.initialize(&mut metadata).unwrap();

    assert!(schema.entity("pg_stat_activity").is_none());

    let book = schema.entity("book").unwrap();
    let fetch = book.fetch_attribute().unwrap();
    assert_eq!(
        fetch.query.render(PlaceholderStyle::Numbered),
        r#"SELECT * FROM "book" WHERE "book_id" = $1"#
    );

    let insert = book.insert_attribute(&book.non_key_mask()).unwrap();
    assert_eq!(
        insert.query.render(PlaceholderStyle::Numbered),
        r#"INSERT INTO "book"("title", "publisher_id", "status") VALUES ($1, $2, $3)"#
    );
    assert_eq!(insert.generated_key_column.as_deref(), Some("book_id"));

    let summary = schema.summary();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["driver"], "postgresql");
    let book_summary = summary.entities.iter().find(|e| e.name == "book").unwrap();
    let publisher = book_summary
        .attributes
        .iter()
        .find(|a| a.name == "publisher")
        .unwrap();
    assert_eq!(publisher.sql, r#"SELECT * FROM "publisher" WHERE "publisher_id" = $1"#);
    assert_eq!(book_summary.attributes[0].name, "iterate");
}

#[test]
fn test_value_filters_through_the_model() {
    let mut model = model(ReverseMode::Columns);
    model.declare_entity(EntityDecl::new("book")).unwrap();
    model.filters_mut().read.add_mapping_str("book.title", "uppercase").unwrap();
    model.filters_mut().write.add_mapping_str("type:text", "no_html").unwrap();
    let mut metadata = bookshelf();
    model.initialize(&mut metadata).unwrap();

    assert_eq!(
        model.read_value("book", "title", Value::from("dune")).unwrap(),
        Value::from("DUNE")
    );
    assert_eq!(
        model.write_value("book", "title", Value::from("Dune")).unwrap(),
        Value::from("Dune")
    );
    assert!(matches!(
        model.write_value("book", "title", Value::from("<b>Dune</b>")),
        Err(ModelError::Transform(TransformError::Validation(_)))
    ));
    assert!(matches!(
        model.read_value("book", "isbn", Value::Null),
        Err(ModelError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn test_obfuscated_key_gets_a_random_cryptograph() {
    let mut model = model(ReverseMode::Columns);
    model.declare_entity(EntityDecl::new("book")).unwrap();
    model.filters_mut().read.add_mapping_str("book.book_id", "obfuscate").unwrap();
    model.filters_mut().write.add_mapping_str("book.book_id", "deobfuscate").unwrap();
    let mut metadata = bookshelf();
    model.initialize(&mut metadata).unwrap();

    let hidden = model.read_value("book", "book_id", Value::Int(42)).unwrap();
    assert_ne!(hidden, Value::Int(42));
    let shown = model.write_value("book", "book_id", hidden).unwrap();
    assert_eq!(shown, Value::from("42"));
}

#[test]
fn test_configured_write_key_survives_initialization() {
    let key = [7u8; 32];
    let mut model = model(ReverseMode::Columns);
    model.declare_entity(EntityDecl::new("book")).unwrap();
    model.filters_mut().write.add_mapping_str("book.title", "obfuscate").unwrap();
    model
        .filters()
        .write
        .set_cryptograph(Arc::new(AesCryptograph::new(&key).unwrap()));
    let mut metadata = bookshelf();
    model.initialize(&mut metadata).unwrap();

    let hidden = model.write_value("book", "title", Value::from("Dune")).unwrap();
    let reader = ValueFilters::new("filters.read");
    reader.set_cryptograph(Arc::new(AesCryptograph::new(&key).unwrap()));
    let shown = reader.resolve("deobfuscate").unwrap().apply(hidden).unwrap();
    assert_eq!(shown, Value::from("Dune"));
}
