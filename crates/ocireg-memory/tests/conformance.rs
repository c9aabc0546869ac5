use ocireg_conformance::RegistryConformanceSuite;
use ocireg_memory::{MemoryConfig, MemoryRegistry};

#[tokio::test]
async fn push_pull_round_trip() {
    let registry = MemoryRegistry::default();
    RegistryConformanceSuite::push_pull_round_trip(&registry, "library/round-trip")
        .await
        .unwrap();
}

#[tokio::test]
async fn tag_immutability() {
    let registry = MemoryRegistry::new(MemoryConfig { immutable_tags: true, lax_child_references: true });
    RegistryConformanceSuite::tag_immutability(&registry, "library/immutable")
        .await
        .unwrap();
}

#[tokio::test]
async fn chunked_upload_resume() {
    let registry = MemoryRegistry::default();
    RegistryConformanceSuite::chunked_upload_resume(&registry, "library/chunked")
        .await
        .unwrap();
}

#[tokio::test]
async fn referrers() {
    let registry = MemoryRegistry::default();
    RegistryConformanceSuite::referrers(&registry, "library/referrers")
        .await
        .unwrap();
}
