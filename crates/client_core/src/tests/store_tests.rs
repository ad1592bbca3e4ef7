use super::*;

fn family(id: &str, name: &str) -> Family {
    Family::new(FamilyId::from(id), name)
}

#[test]
fn starts_empty() {
    let store = SessionStore::new();
    assert_eq!(store.snapshot(), SessionState::default());
    assert!(!store.snapshot().is_authenticated());
}

#[tokio::test]
async fn subscribers_see_each_mutation() {
    let store = SessionStore::new();
    let mut rx = store.subscribe();

    store.set_identity(Some(Identity::from("u-1")));
    rx.changed().await.expect("identity change");
    assert_eq!(
        rx.borrow_and_update().current_identity,
        Some(Identity::from("u-1"))
    );

    store.replace_families(
        vec![family("f-2", "Jones"), family("f-1", "Smith")],
        Some(FamilyId::from("f-2")),
    );
    rx.changed().await.expect("families change");
    let state = rx.borrow_and_update().clone();
    assert_eq!(state.visible_families.len(), 2);
    assert_eq!(state.selected_family().map(|f| f.name.as_str()), Some("Jones"));
}

#[test]
fn identity_change_invalidates_family_list() {
    let store = SessionStore::new();
    store.set_identity(Some(Identity::from("u-1")));
    store.replace_families(vec![family("f-1", "Smith")], Some(FamilyId::from("f-1")));

    store.set_identity(Some(Identity::from("u-1")));
    assert_eq!(store.snapshot().visible_families.len(), 1);

    store.set_identity(Some(Identity::from("u-2")));

    let state = store.snapshot();
    assert_eq!(state.current_identity, Some(Identity::from("u-2")));
    assert!(state.visible_families.is_empty());
    assert_eq!(state.current_family, None);
}

#[test]
fn reset_clears_everything() {
    let store = SessionStore::new();
    store.set_identity(Some(Identity::from("u-1")));
    store.replace_families(vec![family("f-1", "Smith")], Some(FamilyId::from("f-1")));

    store.reset();

    assert_eq!(store.snapshot(), SessionState::default());
}

#[test]
fn dropping_receiver_unsubscribes() {
    let store = SessionStore::new();
    let rx = store.subscribe();
    assert_eq!(store.subscriber_count(), 1);
    drop(rx);
    assert_eq!(store.subscriber_count(), 0);
    store.set_current_family(Some(FamilyId::from("f-9")));
    assert_eq!(store.snapshot().current_family, Some(FamilyId::from("f-9")));
}
