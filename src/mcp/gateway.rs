//! Process-wide registry of named server instances.
//!
//! A locked table with explicit lifecycle control: instances are created on
//! first reference by name, live until explicitly removed, and are never
//! garbage-collected implicitly. A server name resolves to exactly one
//! instance at any time.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use indexmap::IndexMap;

use crate::mcp::events::EventHook;
use crate::mcp::server::ServerInstance;

/// Name of the well-known default instance used when a transport call does
/// not select a server.
pub const DEFAULT_INSTANCE: &str = "default";

type InstanceTable = IndexMap<String, Arc<ServerInstance>>;

static INSTANCES: OnceLock<Mutex<InstanceTable>> = OnceLock::new();
static LIFECYCLE_HOOKS: OnceLock<Mutex<Vec<Arc<dyn EventHook>>>> = OnceLock::new();

fn table() -> MutexGuard<'static, InstanceTable> {
    INSTANCES
        .get_or_init(|| Mutex::new(IndexMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn lifecycle_hooks() -> Vec<Arc<dyn EventHook>> {
    LIFECYCLE_HOOKS
        .get_or_init(|| Mutex::new(Vec::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Registers a hook observing instance creation and removal.
pub fn add_lifecycle_hook(hook: Arc<dyn EventHook>) {
    LIFECYCLE_HOOKS
        .get_or_init(|| Mutex::new(Vec::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(hook);
}

/// Returns the named instance, creating it with defaults on first use.
pub fn get(name: &str) -> Arc<ServerInstance> {
    let (instance, created) = {
        let mut instances = table();
        if let Some(existing) = instances.get(name) {
            (Arc::clone(existing), false)
        } else {
            let instance = Arc::new(ServerInstance::new(name));
            instances.insert(name.to_string(), Arc::clone(&instance));
            (instance, true)
        }
    };

    // Hooks fire outside the table lock; a hook may itself touch the table.
    if created {
        tracing::debug!(server = name, "created server instance");
        for hook in lifecycle_hooks() {
            hook.on_server_created(name);
        }
    }

    instance
}

/// Returns `true` if an instance with the name exists.
#[must_use]
pub fn has_instance(name: &str) -> bool {
    table().contains_key(name)
}

/// Returns the names of all live instances, in creation order.
#[must_use]
pub fn instance_names() -> Vec<String> {
    table().keys().cloned().collect()
}

/// Removes the named instance. Returns `true` if one was removed.
///
/// Removal events fire before the instance leaves the table, on both the
/// gateway lifecycle hooks and the instance's own hooks.
pub fn remove_instance(name: &str) -> bool {
    let Some(instance) = ({
        let instances = table();
        instances.get(name).cloned()
    }) else {
        return false;
    };

    for hook in lifecycle_hooks() {
        hook.on_server_removed(name);
    }
    for hook in instance.hooks_snapshot() {
        hook.on_server_removed(name);
    }

    let removed = table().shift_remove(name).is_some();
    if removed {
        tracing::debug!(server = name, "removed server instance");
    }
    removed
}

/// Removes every instance, firing removal events for each.
pub fn clear_all_instances() {
    for name in instance_names() {
        remove_instance(&name);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn get_creates_on_first_use() {
        clear_all_instances();
        assert!(!has_instance("alpha"));

        let first = get("alpha");
        let second = get("alpha");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(has_instance("alpha"));

        clear_all_instances();
    }

    #[test]
    #[serial]
    fn configuration_survives_reacquisition() {
        clear_all_instances();

        get("beta").with_description("first configuration");
        assert_eq!(get("beta").description(), "first configuration");

        clear_all_instances();
    }

    #[test]
    #[serial]
    fn remove_instance_reports_outcome() {
        clear_all_instances();

        get("gamma");
        assert!(remove_instance("gamma"));
        assert!(!remove_instance("gamma"));
        assert!(!has_instance("gamma"));

        clear_all_instances();
    }

    #[test]
    #[serial]
    fn instance_names_in_creation_order() {
        clear_all_instances();

        get("one");
        get("two");
        get("three");
        assert_eq!(instance_names(), vec!["one", "two", "three"]);

        clear_all_instances();
    }

    #[test]
    #[serial]
    fn removal_fires_instance_hooks() {
        struct Removals(AtomicUsize);
        impl EventHook for Removals {
            fn on_server_removed(&self, _name: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        clear_all_instances();

        let hook = Arc::new(Removals(AtomicUsize::new(0)));
        get("delta").add_event_hook(hook.clone());
        remove_instance("delta");

        assert_eq!(hook.0.load(Ordering::SeqCst), 1);

        clear_all_instances();
    }
}
