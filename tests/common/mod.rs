#![allow(dead_code)]

use dynamic_forms::{ComponentRegistry, RegistryBuilder};
use std::io::Write;
use std::ops::Deref;
use std::path::Path;
use tempfile::{Builder, NamedTempFile, TempDir};

pub struct TestFile(NamedTempFile);

impl Deref for TestFile {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.path()
    }
}

pub fn create_toml_test_file(content: &str) -> TestFile {
    let mut temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
    write!(temp_file, "{}", content).unwrap();
    TestFile(temp_file)
}

pub fn create_json_test_file(content: &str) -> TestFile {
    let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(temp_file, "{}", content).unwrap();
    TestFile(temp_file)
}

/// Write `content` to `name` inside a fresh temporary directory.
pub fn create_file_in_dir(name: &str, content: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(name), content).unwrap();
    dir
}

pub fn survey_schema_json() -> &'static str {
    r#"
    {
        "title": "Survey",
        "fields": [
            { "name": "score", "label": "Score", "type": "number", "min": 1, "max": 5, "required": true },
            { "name": "comment", "type": "text", "max": 140 }
        ]
    }
    "#
}

pub fn builtin_registry() -> ComponentRegistry {
    build_registry_and_assert_ok(ComponentRegistry::builder().with_builtin_forms())
}

pub fn build_registry_and_assert_ok(builder: RegistryBuilder) -> ComponentRegistry {
    let registry_result = builder.build();
    assert!(
        registry_result.is_ok(),
        "build failed with: {:?}",
        registry_result.err()
    );
    registry_result.unwrap()
}
