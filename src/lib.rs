//! Dynamic Forms
//!
//! Lazily resolved form components, looked up by key and mounted
//! through a typed instance handle.

pub use forms::{
    BUILTIN_FORMS, FieldKind, FieldSchema, FormSchema, FormState, SchemaForm, builtin_schema,
};
pub use loader::{ComponentDefinitionEntry, DefinitionSource, load_definitions};
pub use mount::{InstanceRef, InstanceState, Mounted, Registrar, mount};
pub use registry::{
    ComponentFactory, ComponentRegistry, DEFAULT_SLOW_LOAD_DELAY, RegistryBuilder, ResolveError,
};
pub use types::{
    ComponentDefinition, ComponentKey, FieldError, FormComponent, FormData, FormInstance,
    RenderNode, ValidationErrors,
};

pub mod forms;
pub mod loader;
pub mod mount;
pub mod registry;
pub mod types;
