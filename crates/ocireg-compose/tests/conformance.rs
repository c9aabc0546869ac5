use std::sync::Arc;

use ocireg_compose::{ReadPolicy, Unifier};
use ocireg_conformance::RegistryConformanceSuite;
use ocireg_memory::MemoryRegistry;

#[tokio::test]
async fn push_pull_round_trip_sequential() {
    let unifier = Unifier::new(
        Arc::new(MemoryRegistry::default()),
        Arc::new(MemoryRegistry::default()),
        ReadPolicy::Sequential,
    );
    RegistryConformanceSuite::push_pull_round_trip(&unifier, "library/round-trip")
        .await
        .unwrap();
}

#[tokio::test]
async fn push_pull_round_trip_concurrent() {
    let unifier = Unifier::new(
        Arc::new(MemoryRegistry::default()),
        Arc::new(MemoryRegistry::default()),
        ReadPolicy::Concurrent,
    );
    RegistryConformanceSuite::push_pull_round_trip(&unifier, "library/round-trip")
        .await
        .unwrap();
}

#[tokio::test]
async fn chunked_upload_resume() {
    let unifier = Unifier::new(
        Arc::new(MemoryRegistry::default()),
        Arc::new(MemoryRegistry::default()),
        ReadPolicy::Sequential,
    );
    RegistryConformanceSuite::chunked_upload_resume(&unifier, "library/chunked")
        .await
        .unwrap();
}

#[tokio::test]
async fn referrers() {
    let unifier = Unifier::new(
        Arc::new(MemoryRegistry::default()),
        Arc::new(MemoryRegistry::default()),
        ReadPolicy::Concurrent,
    );
    RegistryConformanceSuite::referrers(&unifier, "library/referrers")
        .await
        .unwrap();
}

/// When the two backends disagree on what a tag points at, the
/// unifier must surface the conflict rather than silently pick one.
#[tokio::test]
async fn diverging_backends_report_tag_conflict() {
    let r0 = Arc::new(MemoryRegistry::default());
    let r1 = Arc::new(MemoryRegistry::default());

    let m0 = ocireg_conformance::Image::builder().build().unwrap();
    m0.push(r0.as_ref(), "library/split", Some("latest")).await.unwrap();

    let m1 = ocireg_conformance::Image::builder()
        .layers(vec![ocireg_conformance::Layer::builder()
            .data(bytes::Bytes::from_static(b"a different image"))
            .build()
            .unwrap()])
        .build()
        .unwrap();
    m1.push(r1.as_ref(), "library/split", Some("latest")).await.unwrap();

    let unifier = Unifier::new(r0, r1, ReadPolicy::Concurrent);
    use ocireg_core::registry::Registry;
    let err = unifier.resolve_tag("library/split", "latest").await.unwrap_err();
    assert!(err.is_code(ocireg_core::DistributionErrorCode::Unknown));
}
