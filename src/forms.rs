use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::mount::Registrar;
use crate::types::{
    FieldError, FormComponent, FormData, FormInstance, RenderNode, ValidationErrors,
};

/// Names of the forms compiled into the crate.
pub const BUILTIN_FORMS: [&str; 5] = ["FormOne", "FormTwo", "FormA", "FormB", "FormC"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub title: String,
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Lower bound: numeric value for numbers, character count for text.
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Email,
    Number,
    Checkbox,
    Select { options: Vec<String> },
}

impl FieldKind {
    fn input_type(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Number => "number",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Select { .. } => "select",
        }
    }
}

impl FieldSchema {
    fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: Some(label.to_string()),
            kind,
            required: false,
            min: None,
            max: None,
            default: None,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    fn initial_value(&self) -> serde_json::Value {
        match (&self.default, &self.kind) {
            (Some(value), _) => value.clone(),
            (None, FieldKind::Checkbox) => serde_json::Value::Bool(false),
            (None, _) => serde_json::Value::Null,
        }
    }

    fn check(&self, value: &serde_json::Value) -> Option<String> {
        let blank = match value {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if blank {
            return self.required.then(|| "is required".to_string());
        }

        match &self.kind {
            FieldKind::Text => match value.as_str() {
                Some(text) => self.check_length(text),
                None => Some("must be text".to_string()),
            },
            FieldKind::Email => match value.as_str() {
                Some(text) if is_email(text) => self.check_length(text),
                _ => Some("must be a valid email address".to_string()),
            },
            FieldKind::Number => match value.as_f64() {
                Some(n) => match (self.min, self.max) {
                    (Some(min), _) if n < min => Some(format!("must be at least {min}")),
                    (_, Some(max)) if n > max => Some(format!("must be at most {max}")),
                    _ => None,
                },
                None => Some("must be a number".to_string()),
            },
            FieldKind::Checkbox => match value.as_bool() {
                Some(false) if self.required => Some("must be checked".to_string()),
                Some(_) => None,
                None => Some("must be true or false".to_string()),
            },
            FieldKind::Select { options } => match value.as_str() {
                Some(choice) if options.iter().any(|o| o == choice) => None,
                _ => Some(format!("must be one of: {}", options.join(", "))),
            },
        }
    }

    fn check_length(&self, text: &str) -> Option<String> {
        let len = text.chars().count() as f64;
        match (self.min, self.max) {
            (Some(min), _) if len < min => Some(format!("must be at least {min} characters")),
            (_, Some(max)) if len > max => Some(format!("must be at most {max} characters")),
            _ => None,
        }
    }
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !text.chars().any(char::is_whitespace)
}

impl FormSchema {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read form schema '{}': {e}", path.display())
        })?;
        let schema: FormSchema = serde_json::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse form schema '{}': {e}", path.display())
        })?;
        schema.check()?;
        Ok(schema)
    }

    /// Reject schemas no form could be built from.
    pub fn check(&self) -> Result<()> {
        let mut names = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(anyhow::anyhow!(
                    "Form '{}' has a field without a name",
                    self.title
                ));
            }
            if !names.insert(field.name.as_str()) {
                return Err(anyhow::anyhow!(
                    "Form '{}' declares field '{}' more than once",
                    self.title,
                    field.name
                ));
            }
            if let FieldKind::Select { options } = &field.kind
                && options.is_empty()
            {
                return Err(anyhow::anyhow!(
                    "Select field '{}' in form '{}' has no options",
                    field.name,
                    self.title
                ));
            }
        }
        Ok(())
    }

    fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn initial_values(&self) -> FormData {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.initial_value()))
            .collect()
    }
}

pub fn builtin_schema(name: &str) -> Option<FormSchema> {
    let (title, fields) = match name {
        "FormOne" => (
            "Contact",
            vec![
                FieldSchema::new("name", "Name", FieldKind::Text)
                    .required()
                    .range(Some(2.0), Some(64.0)),
                FieldSchema::new("email", "Email", FieldKind::Email).required(),
            ],
        ),
        "FormTwo" => (
            "Preferences",
            vec![
                FieldSchema::new("newsletter", "Subscribe to newsletter", FieldKind::Checkbox),
                FieldSchema::new(
                    "theme",
                    "Theme",
                    FieldKind::Select {
                        options: vec!["light".to_string(), "dark".to_string()],
                    },
                ),
            ],
        ),
        "FormA" => (
            "Account",
            vec![
                FieldSchema::new("username", "Username", FieldKind::Text)
                    .required()
                    .range(Some(3.0), Some(32.0)),
                FieldSchema::new("email", "Email", FieldKind::Email).required(),
            ],
        ),
        "FormB" => (
            "Profile",
            vec![
                FieldSchema::new("age", "Age", FieldKind::Number)
                    .required()
                    .range(Some(18.0), Some(130.0)),
                FieldSchema::new("bio", "Bio", FieldKind::Text).range(None, Some(280.0)),
            ],
        ),
        "FormC" => (
            "Agreement",
            vec![
                FieldSchema::new(
                    "plan",
                    "Plan",
                    FieldKind::Select {
                        options: vec!["free".to_string(), "pro".to_string()],
                    },
                )
                .required(),
                FieldSchema::new("accept_terms", "I accept the terms", FieldKind::Checkbox)
                    .required(),
            ],
        ),
        _ => return None,
    };
    Some(FormSchema {
        title: title.to_string(),
        fields,
    })
}

/// Renders a [`FormSchema`] and registers a [`FormState`] for it.
#[derive(Debug, Clone)]
pub struct SchemaForm {
    schema: Arc<FormSchema>,
}

impl SchemaForm {
    pub fn new(schema: FormSchema) -> Self {
        Self {
            schema: Arc::new(schema),
        }
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    fn render_field(field: &FieldSchema) -> RenderNode {
        let label = field.label.as_deref().unwrap_or(&field.name);
        let mut input = RenderNode::element(match field.kind {
            FieldKind::Select { .. } => "select",
            _ => "input",
        })
        .attr("name", &field.name)
        .attr("type", field.kind.input_type());
        if field.required {
            input = input.attr("required", "true");
        }
        if let FieldKind::Select { options } = &field.kind {
            for option in options {
                input = input.child(
                    RenderNode::element("option")
                        .attr("value", option)
                        .child(RenderNode::text(option)),
                );
            }
        }

        RenderNode::element("label")
            .attr("for", &field.name)
            .child(RenderNode::text(label))
            .child(input)
    }
}

impl FormComponent for SchemaForm {
    fn render(&self, registrar: &Registrar) -> RenderNode {
        let form = self.schema.fields.iter().fold(
            RenderNode::element("form").attr("title", &self.schema.title),
            |form, field| form.child(Self::render_field(field)),
        );
        registrar.register(Arc::new(FormState::new(self.schema.clone())));
        form
    }
}

#[derive(Debug)]
pub struct FormState {
    schema: Arc<FormSchema>,
    values: Mutex<FormData>,
}

impl FormState {
    pub fn new(schema: Arc<FormSchema>) -> Self {
        let values = Mutex::new(schema.initial_values());
        Self { schema, values }
    }

    fn values(&self) -> MutexGuard<'_, FormData> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FormInstance for FormState {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let values = self.values();
        let errors: Vec<_> = self
            .schema
            .fields
            .iter()
            .filter_map(|field| {
                let value = values.get(&field.name).unwrap_or(&serde_json::Value::Null);
                field.check(value).map(|message| FieldError {
                    field: field.name.clone(),
                    message,
                })
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors { errors })
        }
    }

    fn value(&self) -> FormData {
        self.values().clone()
    }

    fn set_field(&self, field: &str, value: serde_json::Value) -> Result<()> {
        if self.schema.field(field).is_none() {
            return Err(anyhow::anyhow!(
                "Form '{}' has no field '{field}'",
                self.schema.title
            ));
        }
        self.values().insert(field.to_string(), value);
        Ok(())
    }

    fn reset(&self) {
        *self.values() = self.schema.initial_values();
    }
}
