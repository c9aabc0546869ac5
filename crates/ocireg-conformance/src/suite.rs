//! Runs end-to-end scenarios and quantified invariants against any
//! [`Registry`]. `ocireg-memory` and `ocireg-compose` each pull this
//! crate in as a dev-dependency and run the suite against their own
//! backend in an integration test, mirroring how `oci-distribution-test`
//! is exercised against `portfolio_backend_postgres`.

use futures::StreamExt;

use ocireg_core::registry::Registry;
use ocireg_core::{collect_all, Descriptor, Digest, DistributionErrorCode};

use crate::errors::{Error, Result};
use crate::fixtures::Image;
use crate::single_chunk;

fn assert_that(cond: bool, msg: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::Assertion(msg.into()))
    }
}

/// A backend-agnostic conformance check suite. Each method is an
/// independent scenario; callers pick which to run against their
/// backend (e.g. a read-only wrapper has no reason to run the write
/// scenarios).
pub struct RegistryConformanceSuite;

impl RegistryConformanceSuite {
    /// Push-pull round trip and range-read clamping.
    pub async fn push_pull_round_trip(registry: &dyn Registry, repo: &str) -> Result<()> {
        let bytes = bytes::Bytes::from_static(b"hello world");
        let digest = Digest::of(&bytes);
        let provisional = Descriptor::new("application/octet-stream", digest.clone(), bytes.len() as i64);

        let descriptor = registry.push_blob(repo, &provisional, single_chunk(bytes)).await?;
        assert_that(
            descriptor.digest.to_string() == "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            "unexpected digest for \"hello world\"",
        )?;
        assert_that(descriptor.size == 11, "unexpected size for \"hello world\"")?;

        let mut s = registry.get_blob_range(repo, &digest, 1, 5).await?;
        let chunk = s.next().await.ok_or_else(|| Error::Assertion("empty range read".into()))??;
        assert_that(&chunk[..] == b"ello", "range (1,5) did not return \"ello\"")?;

        let mut s = registry.get_blob_range(repo, &digest, 1, -1).await?;
        let chunk = s.next().await.ok_or_else(|| Error::Assertion("empty range read".into()))??;
        assert_that(&chunk[..] == b"ello world", "range (1,-1) did not return \"ello world\"")?;

        let mut s = registry.get_blob_range(repo, &digest, 1, 5000).await?;
        let chunk = s.next().await.ok_or_else(|| Error::Assertion("empty range read".into()))??;
        assert_that(&chunk[..] == b"ello world", "range (1,5000) did not clamp to \"ello world\"")?;

        Ok(())
    }

    /// Under an immutable-tag policy, re-pushing the
    /// same (digest, media type) to a tag is idempotent; pushing a
    /// different manifest or deleting the tag is denied. The caller
    /// must have constructed `registry` with immutable tags enabled.
    pub async fn tag_immutability(registry: &dyn Registry, repo: &str) -> Result<()> {
        let m1 = Image::builder().build()?;
        let d1 = m1.push(registry, repo, Some("v1")).await?;

        let d1_again = m1.push(registry, repo, Some("v1")).await?;
        assert_that(d1.digest == d1_again.digest, "idempotent re-push changed the tag's digest")?;

        let m2 = Image::builder()
            .layers(vec![crate::fixtures::Layer::builder().data(bytes::Bytes::from_static(b"layer")).build()?])
            .build()?;
        let err = m2.push(registry, repo, Some("v1")).await.unwrap_err();
        assert_that(
            matches!(&err, Error::Core(e) if e.is_code(DistributionErrorCode::Denied)),
            "pushing a different manifest to an immutable tag did not return DENIED",
        )?;

        let err = registry.delete_tag(repo, "v1").await.unwrap_err();
        assert_that(err.is_code(DistributionErrorCode::Denied), "deleting an immutable tag did not return DENIED")?;

        Ok(())
    }

    /// Chunked upload, connection drop, resume by GET,
    /// and a final commit with digest verification.
    pub async fn chunked_upload_resume(registry: &dyn Registry, repo: &str) -> Result<()> {
        let first = vec![b'a'; 10 * 1024];
        let second = vec![b'b'; 10 * 1024];

        let mut writer = registry.push_blob_chunked(repo, 0).await?;
        writer.write(bytes::Bytes::from(first.clone())).await?;
        assert_that(writer.size() == 10 * 1024, "size after first chunk should be 10 KiB")?;
        let id = writer.id().to_string();
        writer.close().await?;

        let mut resumed = registry.push_blob_chunked_resume(repo, &id, 10 * 1024, 0).await?;
        assert_that(resumed.size() == 10 * 1024, "resumed session lost its accumulated size")?;
        resumed.write(bytes::Bytes::from(second.clone())).await?;

        let mut all = first;
        all.extend(second);
        let digest = Digest::of(&all);

        let wrong = Digest::of(b"not the right bytes");
        let retry = registry.push_blob_chunked_resume(repo, &id, 20 * 1024, 0).await?;
        let err = retry.commit(&wrong).await.unwrap_err();
        assert_that(err.is_code(DistributionErrorCode::DigestInvalid), "mismatched digest did not return DIGEST_INVALID")?;

        let writer = registry.push_blob_chunked_resume(repo, &id, 20 * 1024, 0).await?;
        let descriptor = writer.commit(&digest).await?;
        assert_that(descriptor.size == 20 * 1024, "committed blob size did not match the 20 KiB upload")?;

        Ok(())
    }

    /// Referrers by subject and artifact-type
    /// filtering, in digest order.
    pub async fn referrers(registry: &dyn Registry, repo: &str) -> Result<()> {
        let m = Image::builder().build()?;
        let m_desc = m.push(registry, repo, None).await?;

        let mut referrer_descs = Vec::new();
        for i in 0..3 {
            let r = Image::builder()
                .layers(vec![crate::fixtures::Layer::builder().data(bytes::Bytes::from(format!("referrer-{i}"))).build()?])
                .subject(m_desc.clone())
                .build()?;
            referrer_descs.push(r.push(registry, repo, None).await?);
        }
        let r1 = Image::builder()
            .layers(vec![crate::fixtures::Layer::builder().data(bytes::Bytes::from_static(b"r3-layer")).build()?])
            .subject(referrer_descs[1].clone())
            .build()?;
        let r3_desc = r1.push(registry, repo, None).await?;

        let found = collect_all(registry.referrers(repo, &m_desc.digest, None).await?).await?;
        let mut expected_digests: Vec<String> = referrer_descs.iter().map(|d| d.digest.to_string()).collect();
        expected_digests.sort();
        let mut found_digests: Vec<String> = found.iter().map(|d| d.digest.to_string()).collect();
        found_digests.sort();
        assert_that(found_digests == expected_digests, "referrers of the base manifest did not match the pushed set")?;

        let found = collect_all(registry.referrers(repo, &referrer_descs[1].digest, None).await?).await?;
        assert_that(
            found.len() == 1 && found[0].digest == r3_desc.digest,
            "referrers of the nested manifest did not return exactly its one child",
        )?;

        Ok(())
    }
}
