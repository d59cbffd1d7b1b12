use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::mount::Registrar;

/// Field values of a form, keyed by field name.
pub type FormData = serde_json::Map<String, serde_json::Value>;

/// Symbolic name of a registry entry, e.g. `FormA`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentKey(String);

impl ComponentKey {
    pub fn new(key: impl Into<String>) -> anyhow::Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(anyhow::anyhow!("Component key must not be empty"));
        }
        if let Some(ch) = key
            .chars()
            .find(|ch| ch.is_whitespace() || ch.is_control())
        {
            return Err(anyhow::anyhow!(
                "Invalid component key '{}': contains {ch:?}",
                key.escape_debug()
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ComponentKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ComponentKey {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ComponentKey> for String {
    fn from(key: ComponentKey) -> Self {
        key.0
    }
}

impl Borrow<str> for ComponentKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A renderable unit. Implementations hand their instance to the host
/// through the [`Registrar`], either while rendering or at any later point.
pub trait FormComponent: Send + Sync {
    fn render(&self, registrar: &Registrar) -> RenderNode;
}

/// Capabilities a mounted form exposes to whoever mounted it.
pub trait FormInstance: Send + Sync {
    fn validate(&self) -> Result<(), ValidationErrors>;

    fn value(&self) -> FormData;

    /// Set a single field. Fails if the field does not exist.
    fn set_field(&self, field: &str, value: serde_json::Value) -> anyhow::Result<()>;

    fn reset(&self);
}

/// Loaded component, as produced by a registry factory.
#[derive(Clone)]
pub struct ComponentDefinition {
    name: String,
    component: Arc<dyn FormComponent>,
}

impl ComponentDefinition {
    pub fn new(name: impl Into<String>, component: impl FormComponent + 'static) -> Self {
        Self {
            name: name.into(),
            component: Arc::new(component),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn component(&self) -> &dyn FormComponent {
        self.component.as_ref()
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Output of rendering a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderNode {
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<RenderNode>,
    },
    Text(String),
}

impl RenderNode {
    pub fn element(tag: impl Into<String>) -> Self {
        RenderNode::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        RenderNode::Text(text.into())
    }

    /// Add an attribute. No-op on text nodes.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let RenderNode::Element { attrs, .. } = &mut self {
            attrs.insert(name.into(), value.into());
        }
        self
    }

    pub fn child(mut self, node: RenderNode) -> Self {
        if let RenderNode::Element { children, .. } = &mut self {
            children.push(node);
        }
        self
    }

    pub fn children(&self) -> &[RenderNode] {
        match self {
            RenderNode::Element { children, .. } => children,
            RenderNode::Text(_) => &[],
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        match self {
            RenderNode::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            RenderNode::Text(_) => None,
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            RenderNode::Text(text) => writeln!(f, "{indent}{text}"),
            RenderNode::Element {
                tag,
                attrs,
                children,
            } => {
                write!(f, "{indent}<{tag}")?;
                for (name, value) in attrs {
                    let value = value.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, " {name}=\"{value}\"")?;
                }
                if children.is_empty() {
                    return writeln!(f, " />");
                }
                writeln!(f, ">")?;
                for child in children {
                    child.write_indented(f, depth + 1)?;
                }
                writeln!(f, "{indent}</{tag}>")
            }
        }
    }
}

impl fmt::Display for RenderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} field(s) failed validation: {}", .errors.len(), join_errors(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Whether `field` has at least one error.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
