use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::types::{ComponentDefinition, FormInstance, RenderNode};

#[derive(Clone)]
enum Slot {
    Unset,
    Set(Arc<dyn FormInstance>),
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Unset,
    Set,
    Cleared,
}

struct MountShared {
    mount_id: Uuid,
    component: String,
    slot: watch::Sender<Slot>,
}

impl MountShared {
    fn teardown(&self) {
        let cleared = self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Cleared) {
                false
            } else {
                *slot = Slot::Cleared;
                true
            }
        });
        if cleared {
            tracing::debug!(
                mount_id = %self.mount_id,
                component = %self.component,
                "Unmounted component"
            );
        }
    }
}

/// Registration callback handed to a component during render.
#[derive(Clone)]
pub struct Registrar {
    shared: Arc<MountShared>,
}

impl Registrar {
    /// Only the first call of a mount takes effect. Returns `false` if an
    /// instance was already registered or the component has been unmounted.
    pub fn register(&self, instance: Arc<dyn FormInstance>) -> bool {
        let mut unmounted = false;
        let accepted = self.shared.slot.send_if_modified(|slot| match slot {
            Slot::Unset => {
                *slot = Slot::Set(instance);
                true
            }
            Slot::Set(_) => false,
            Slot::Cleared => {
                unmounted = true;
                false
            }
        });

        if accepted {
            tracing::debug!(
                mount_id = %self.shared.mount_id,
                component = %self.shared.component,
                "Component registered its instance"
            );
        } else if unmounted {
            tracing::warn!(
                mount_id = %self.shared.mount_id,
                component = %self.shared.component,
                "Ignoring registration after unmount"
            );
        } else {
            tracing::warn!(
                mount_id = %self.shared.mount_id,
                component = %self.shared.component,
                "Ignoring repeated registration"
            );
        }
        accepted
    }

    pub fn mount_id(&self) -> Uuid {
        self.shared.mount_id
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("mount_id", &self.shared.mount_id)
            .field("component", &self.shared.component)
            .finish()
    }
}

/// Handle to the instance a mounted component registered.
#[derive(Clone)]
pub struct InstanceRef {
    slot: watch::Receiver<Slot>,
}

impl InstanceRef {
    pub fn get(&self) -> Option<Arc<dyn FormInstance>> {
        match &*self.slot.borrow() {
            Slot::Set(instance) => Some(instance.clone()),
            Slot::Unset | Slot::Cleared => None,
        }
    }

    pub fn is_set(&self) -> bool {
        self.state() == InstanceState::Set
    }

    pub fn state(&self) -> InstanceState {
        match &*self.slot.borrow() {
            Slot::Unset => InstanceState::Unset,
            Slot::Set(_) => InstanceState::Set,
            Slot::Cleared => InstanceState::Cleared,
        }
    }

    // None once torn down; pends forever if the component never registers
    pub async fn registered(&self) -> Option<Arc<dyn FormInstance>> {
        let mut rx = self.slot.clone();
        let slot = rx
            .wait_for(|slot| !matches!(slot, Slot::Unset))
            .await
            .ok()?;
        match &*slot {
            Slot::Set(instance) => Some(instance.clone()),
            Slot::Unset | Slot::Cleared => None,
        }
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRef")
            .field("state", &self.state())
            .finish()
    }
}

pub struct Mounted {
    output: RenderNode,
    instance: InstanceRef,
    shared: Arc<MountShared>,
}

impl Mounted {
    pub fn output(&self) -> &RenderNode {
        &self.output
    }

    pub fn instance(&self) -> &InstanceRef {
        &self.instance
    }

    pub fn mount_id(&self) -> Uuid {
        self.shared.mount_id
    }

    pub fn component_name(&self) -> &str {
        &self.shared.component
    }

    pub fn unmount(self) {}
}

impl Drop for Mounted {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl fmt::Debug for Mounted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounted")
            .field("mount_id", &self.shared.mount_id)
            .field("component", &self.shared.component)
            .field("instance", &self.instance)
            .finish()
    }
}

/// Render `definition` and capture the instance it registers.
pub fn mount(definition: &ComponentDefinition) -> Mounted {
    let (tx, rx) = watch::channel(Slot::Unset);
    let shared = Arc::new(MountShared {
        mount_id: Uuid::new_v4(),
        component: definition.name().to_string(),
        slot: tx,
    });
    let registrar = Registrar {
        shared: shared.clone(),
    };

    let output = definition.component().render(&registrar);
    let instance = InstanceRef { slot: rx };
    tracing::debug!(
        mount_id = %shared.mount_id,
        component = %shared.component,
        registered = instance.is_set(),
        "Mounted component"
    );

    Mounted {
        output,
        instance,
        shared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FormComponent, FormData, ValidationErrors};

    struct StubInstance;

    impl FormInstance for StubInstance {
        fn validate(&self) -> Result<(), ValidationErrors> {
            Ok(())
        }

        fn value(&self) -> FormData {
            FormData::new()
        }

        fn set_field(&self, field: &str, _value: serde_json::Value) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("Unknown field '{field}'"))
        }

        fn reset(&self) {}
    }

    /// Registers `times` times during render.
    struct Eager {
        times: usize,
    }

    impl FormComponent for Eager {
        fn render(&self, registrar: &Registrar) -> RenderNode {
            for _ in 0..self.times {
                registrar.register(Arc::new(StubInstance));
            }
            RenderNode::element("stub")
        }
    }

    #[test]
    fn test_registration_sets_reference() {
        let mounted = mount(&ComponentDefinition::new("Eager", Eager { times: 1 }));
        assert_eq!(mounted.output(), &RenderNode::element("stub"));
        assert_eq!(mounted.component_name(), "Eager");
        assert!(mounted.instance().is_set());
        assert!(mounted.instance().get().is_some());
    }

    #[test]
    fn test_silent_component_leaves_reference_unset() {
        let mounted = mount(&ComponentDefinition::new("Silent", Eager { times: 0 }));
        assert_eq!(mounted.instance().state(), InstanceState::Unset);
        assert!(mounted.instance().get().is_none());
    }

    #[test]
    fn test_unmount_clears_reference() {
        let mounted = mount(&ComponentDefinition::new("Eager", Eager { times: 1 }));
        let instance = mounted.instance().clone();
        mounted.unmount();
        assert_eq!(instance.state(), InstanceState::Cleared);
        assert!(instance.get().is_none());
    }

    /// Keeps the registrar for the test to use after render.
    struct Deferred(Arc<std::sync::Mutex<Option<Registrar>>>);

    impl FormComponent for Deferred {
        fn render(&self, registrar: &Registrar) -> RenderNode {
            *self.0.lock().unwrap() = Some(registrar.clone());
            RenderNode::element("stub")
        }
    }

    #[test]
    fn test_register_reports_acceptance() {
        let kept = Arc::new(std::sync::Mutex::new(None));
        let mounted = mount(&ComponentDefinition::new("Deferred", Deferred(kept.clone())));
        let registrar: Registrar = kept.lock().unwrap().take().unwrap();
        assert_eq!(mounted.instance().state(), InstanceState::Unset);

        assert!(registrar.register(Arc::new(StubInstance)));
        assert!(!registrar.register(Arc::new(StubInstance)));
        assert_eq!(mounted.instance().state(), InstanceState::Set);

        mounted.unmount();
        assert!(!registrar.register(Arc::new(StubInstance)));
    }

    #[test]
    fn test_each_mount_is_independent() {
        let definition = ComponentDefinition::new("Eager", Eager { times: 1 });
        let first = mount(&definition);
        let second = mount(&definition);
        assert_ne!(first.mount_id(), second.mount_id());
        drop(first);
        assert!(second.instance().is_set());
    }
}
