mod common;

use dynamic_forms::{ComponentRegistry, DefinitionSource, ResolveError, load_definitions, mount};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_builtin_alias_with_delay() {
    let toml_file = common::create_toml_test_file(
        r#"
        [Signup]
        uri = "builtin:FormA"
        delay-ms = 300
        "#,
    );

    let definitions = load_definitions(&[toml_file.to_path_buf()]).unwrap();
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].key.as_str(), "Signup");
    assert_eq!(
        definitions[0].source,
        DefinitionSource::Builtin("FormA".to_string())
    );
    assert_eq!(definitions[0].delay, Some(Duration::from_millis(300)));

    let registry = common::build_registry_and_assert_ok(
        ComponentRegistry::builder().load_file(toml_file.to_path_buf()),
    );
    let start = Instant::now();
    let definition = registry.resolve("Signup").await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(definition.name(), "Signup");
}

#[tokio::test]
async fn test_schema_file_definition() {
    let schema_file = common::create_json_test_file(common::survey_schema_json());
    let toml_content = format!(
        r#"
        [Survey]
        uri = "file://{}"
        "#,
        schema_file.display()
    );
    let toml_file = common::create_toml_test_file(&toml_content);

    let registry = common::build_registry_and_assert_ok(
        ComponentRegistry::builder()
            .with_builtin_forms()
            .load_file(toml_file.to_path_buf()),
    );
    assert_eq!(registry.len(), 6);

    let mounted = mount(&registry.resolve("Survey").await.unwrap());
    assert_eq!(mounted.output().get_attr("title"), Some("Survey"));
    let form = mounted.instance().get().unwrap();
    assert!(form.validate().unwrap_err().has_field("score"));
    form.set_field("score", json!(4)).unwrap();
    assert!(form.validate().is_ok());
}

#[tokio::test]
async fn test_relative_schema_path() {
    let dir = common::create_file_in_dir("survey.json", common::survey_schema_json());
    let toml_path = dir.path().join("forms.toml");
    std::fs::write(
        &toml_path,
        r#"
        [Survey]
        uri = "survey.json"
        "#,
    )
    .unwrap();

    let registry =
        common::build_registry_and_assert_ok(ComponentRegistry::builder().load_file(&toml_path));
    let definition = registry.resolve("Survey").await.unwrap();
    assert_eq!(definition.name(), "Survey");
}

#[tokio::test]
async fn test_missing_schema_file_is_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("gone.json");
    let toml_content = format!(
        r#"
        [Gone]
        uri = "{}"
        "#,
        schema_path.display()
    );
    let toml_file = common::create_toml_test_file(&toml_content);

    // Schema files are read when resolved, not when the registry is built
    let registry = common::build_registry_and_assert_ok(
        ComponentRegistry::builder().load_file(toml_file.to_path_buf()),
    );
    let err = registry.resolve("Gone").await.unwrap_err();
    assert!(matches!(err, ResolveError::LoadFailure { ref key, .. } if key == "Gone"));
    let ResolveError::LoadFailure { source, .. } = err else {
        unreachable!()
    };
    assert!(source.to_string().contains("Failed to read form schema"));
}

#[tokio::test]
async fn test_schema_file_read_on_every_resolve() {
    let dir = common::create_file_in_dir("survey.json", common::survey_schema_json());
    let schema_path = dir.path().join("survey.json");
    let toml_path = dir.path().join("forms.toml");
    std::fs::write(&toml_path, "[Survey]\nuri = \"survey.json\"\n").unwrap();

    let registry =
        common::build_registry_and_assert_ok(ComponentRegistry::builder().load_file(&toml_path));
    assert!(registry.resolve("Survey").await.is_ok());

    std::fs::write(&schema_path, "{ not json").unwrap();
    let err = anyhow::Error::from(registry.resolve("Survey").await.unwrap_err());
    assert!(format!("{err:#}").contains("Failed to parse form schema"));
}

#[test]
#[should_panic(expected = "Definition 'Signup' missing required 'uri' field")]
fn test_missing_uri() {
    let toml_file = common::create_toml_test_file(
        r#"
        [Signup]
        delay-ms = 10
        "#,
    );
    ComponentRegistry::builder()
        .load_file(toml_file.to_path_buf())
        .build()
        .unwrap();
}

#[test]
#[should_panic(expected = "Definition 'Signup' must be a table")]
fn test_non_table_definition() {
    let toml_file = common::create_toml_test_file(r#"Signup = "builtin:FormA""#);
    ComponentRegistry::builder()
        .load_file(toml_file.to_path_buf())
        .build()
        .unwrap();
}

#[test]
#[should_panic(expected = "Failed to parse definition 'Signup'")]
fn test_unknown_definition_field() {
    let toml_file = common::create_toml_test_file(
        r#"
        [Signup]
        uri = "builtin:FormA"
        cache = true
        "#,
    );
    ComponentRegistry::builder()
        .load_file(toml_file.to_path_buf())
        .build()
        .unwrap();
}

#[test]
#[should_panic(expected = "refers to unknown built-in form 'FormZ'")]
fn test_unknown_builtin() {
    let toml_file = common::create_toml_test_file(
        r#"
        [Signup]
        uri = "builtin:FormZ"
        "#,
    );
    ComponentRegistry::builder()
        .load_file(toml_file.to_path_buf())
        .build()
        .unwrap();
}

#[test]
#[should_panic(expected = "Duplicate component key: 'FormA'")]
fn test_definition_collides_with_builtin() {
    let toml_file = common::create_toml_test_file(
        r#"
        [FormA]
        uri = "builtin:FormB"
        "#,
    );
    ComponentRegistry::builder()
        .with_builtin_forms()
        .load_file(toml_file.to_path_buf())
        .build()
        .unwrap();
}

#[test]
fn test_unsupported_definition_file_type() {
    let schema_file = common::create_json_test_file(common::survey_schema_json());
    let result = load_definitions(&[schema_file.to_path_buf()]);
    assert!(
        result
            .unwrap_err()
            .to_string()
            .starts_with("Unsupported file type")
    );
}
