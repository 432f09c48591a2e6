//! Gateway lifecycle integration: the process-wide instance table.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serial_test::serial;
use toolbridge_mcp::mcp::events::EventHook;
use toolbridge_mcp::mcp::gateway;

#[test]
#[serial]
fn test_get_or_create_semantics() {
    gateway::clear_all_instances();

    assert!(!gateway::has_instance("lifecycle-a"));
    let first = gateway::get("lifecycle-a");
    let second = gateway::get("lifecycle-a");
    assert!(Arc::ptr_eq(&first, &second));

    gateway::clear_all_instances();
}

#[test]
#[serial]
fn test_name_resolves_to_exactly_one_instance() {
    gateway::clear_all_instances();

    gateway::get("lifecycle-b").with_description("configured once");

    // A later lookup by the same name sees the same configured instance
    assert_eq!(gateway::get("lifecycle-b").description(), "configured once");
    assert_eq!(
        gateway::instance_names()
            .iter()
            .filter(|name| name.as_str() == "lifecycle-b")
            .count(),
        1
    );

    gateway::clear_all_instances();
}

#[test]
#[serial]
fn test_removal_fires_event_before_removal() {
    struct SawRemoval {
        observed_while_live: AtomicUsize,
    }
    impl EventHook for SawRemoval {
        fn on_server_removed(&self, name: &str) {
            // The instance must still be resolvable while the event fires
            if gateway::has_instance(name) {
                self.observed_while_live.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    gateway::clear_all_instances();

    let hook = Arc::new(SawRemoval {
        observed_while_live: AtomicUsize::new(0),
    });
    gateway::get("lifecycle-c").add_event_hook(hook.clone());

    assert!(gateway::remove_instance("lifecycle-c"));
    assert_eq!(hook.observed_while_live.load(Ordering::SeqCst), 1);
    assert!(!gateway::has_instance("lifecycle-c"));

    gateway::clear_all_instances();
}

#[test]
#[serial]
fn test_clear_all_instances_empties_table() {
    gateway::clear_all_instances();

    gateway::get("lifecycle-d1");
    gateway::get("lifecycle-d2");
    assert_eq!(gateway::instance_names().len(), 2);

    gateway::clear_all_instances();
    assert!(gateway::instance_names().is_empty());
}

#[test]
#[serial]
fn test_instances_are_isolated() {
    gateway::clear_all_instances();

    gateway::get("lifecycle-e1").with_basic_auth("admin", "secret");
    let open = gateway::get("lifecycle-e2");

    // The sibling instance has no auth configured
    assert!(open.security_policy().basic_auth.is_none());

    gateway::clear_all_instances();
}
