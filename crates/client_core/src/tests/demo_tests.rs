use super::*;

fn credentials() -> Credentials {
    Credentials::new("demo@example.com", "anything")
}

async fn sign_in(backend: &DemoBackend) -> Identity {
    let grant = backend.sign_in(&credentials()).await.expect("sign in");
    let identity = grant.identity.clone();
    backend.activate_session(grant).await;
    identity
}

#[tokio::test]
async fn each_sign_in_yields_a_distinct_identity() {
    let backend = DemoBackend::new();
    let first = sign_in(&backend).await;
    let second = sign_in(&backend).await;
    assert_ne!(first, second);
    assert!(first.as_str().starts_with("demo-"));
    assert_eq!(backend.active_identity().await, Some(second));
}

#[tokio::test]
async fn unactivated_grant_leaves_backend_untouched() {
    let backend = DemoBackend::new();
    let _grant = backend.sign_in(&credentials()).await.expect("sign in");

    assert!(backend.active_identity().await.is_none());
    assert!(backend.list_families().await.expect("list").is_empty());
}

#[tokio::test]
async fn first_sign_in_seeds_exactly_one_family() {
    let backend = DemoBackend::new();
    sign_in(&backend).await;
    sign_in(&backend).await;

    let families = backend.list_families().await.expect("list");
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].name, DEMO_FAMILY_NAME);
}

#[tokio::test]
async fn created_families_are_prepended() {
    let backend = DemoBackend::new();
    let smith = backend.create_family(None, "Smith Family").await.expect("smith");
    let jones = backend.create_family(None, "Jones Family").await.expect("jones");
    assert_ne!(smith.id, jones.id);

    let names: Vec<_> = backend
        .list_families()
        .await
        .expect("list")
        .into_iter()
        .map(|family| family.name)
        .collect();
    assert_eq!(names, vec!["Jones Family", "Smith Family"]);
}

#[tokio::test]
async fn first_created_family_replaces_placeholder() {
    let backend = DemoBackend::new();
    sign_in(&backend).await;

    backend.create_family(None, "Smith Family").await.expect("smith");
    backend.create_family(None, "Jones Family").await.expect("jones");
    sign_in(&backend).await;

    let names: Vec<_> = backend
        .list_families()
        .await
        .expect("list")
        .into_iter()
        .map(|family| family.name)
        .collect();
    assert_eq!(names, vec!["Jones Family", "Smith Family"]);
}

#[tokio::test]
async fn sign_up_and_session_feed_are_unavailable() {
    let backend = DemoBackend::new();
    assert!(matches!(
        backend.sign_up(&credentials()).await.expect("sign up"),
        Registration::Unsupported
    ));
    assert!(backend.current_session().await.expect("session").is_none());
    assert!(backend.observe_session_changes().is_none());
    assert_eq!(backend.mode(), Mode::Demo);
}
