//! The two-backend mirror: presents `r0` and `r1` as a single
//! [`Registry`]. Reads follow a [`ReadPolicy`]; writes fan out to both
//! and only succeed if both sides succeed; listings merge the two
//! ordered streams into one deduplicated sequence.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use ocireg_core::registry::{BlobWriter, Registry};
use ocireg_core::{
    collect_all, ByteStream, Descriptor, Digest, DistributionErrorCode, Error, Paged, Result,
};

use crate::error::Error as ComposeError;

/// How a read is dispatched across the two backing registries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Try `r0`; fall back to `r1` only if `r0` fails.
    Sequential,
    /// Race both; take whichever succeeds first. If the first to
    /// finish errors, wait for the other instead of failing outright.
    Concurrent,
}

fn asymmetry(op: &str) -> Error {
    ComposeError::WriteAsymmetry(op.to_string()).into()
}

fn is_not_found(e: &Error) -> bool {
    e.is_code(DistributionErrorCode::NameUnknown) || e.is_code(DistributionErrorCode::ManifestUnknown)
}

fn paged<T: Send + 'static>(items: Vec<T>) -> Paged<T> {
    Box::pin(futures::stream::iter(items.into_iter().map(Ok)))
}

/// Runs two same-typed futures under a [`ReadPolicy`]. Dropping the
/// loser is how cancellation happens in async Rust: `tokio::select!`
/// polls both branches but only the winning arm's future is kept
/// alive past the `select!`, so the other simply stops making
/// progress. On `Concurrent`, an error from the first to finish does
/// not short-circuit -- the policy waits on the second leg instead.
async fn race<T, Fut0, Fut1>(policy: ReadPolicy, fut0: Fut0, fut1: Fut1) -> Result<T>
where
    Fut0: std::future::Future<Output = Result<T>>,
    Fut1: std::future::Future<Output = Result<T>>,
{
    match policy {
        ReadPolicy::Sequential => match fut0.await {
            Ok(v) => Ok(v),
            Err(_) => fut1.await,
        },
        ReadPolicy::Concurrent => {
            tokio::select! {
                r0 = fut0 => match r0 {
                    Ok(v) => Ok(v),
                    Err(_) => fut1.await,
                },
                r1 = fut1 => match r1 {
                    Ok(v) => Ok(v),
                    Err(_) => fut0.await,
                },
            }
        }
    }
}

/// Merges two already-sorted, cursor-filtered listings into one
/// deduplicated sequence. A `NAME_UNKNOWN`/`MANIFEST_UNKNOWN` side is
/// treated as an empty listing; if both sides report not-found, the
/// merge itself reports not-found.
async fn merge_listing<T, K, F>(left: Result<Paged<T>>, right: Result<Paged<T>>, key: F) -> Result<Paged<T>>
where
    T: Send + 'static,
    K: Ord,
    F: Fn(&T) -> K,
{
    let (mut left_items, left_missing) = match left {
        Ok(s) => (collect_all(s).await?, false),
        Err(e) if is_not_found(&e) => (Vec::new(), true),
        Err(e) => return Err(e),
    };
    let (right_items, right_missing) = match right {
        Ok(s) => (collect_all(s).await?, false),
        Err(e) if is_not_found(&e) => (Vec::new(), true),
        Err(e) => return Err(e),
    };

    if left_missing && right_missing {
        return Err(Error::name_unknown());
    }

    left_items.extend(right_items);
    left_items.sort_by(|a, b| key(a).cmp(&key(b)));
    left_items.dedup_by(|a, b| key(a) == key(b));
    Ok(paged(left_items))
}

/// Presents `r0` and `r1` as one [`Registry`].
pub struct Unifier {
    r0: Arc<dyn Registry>,
    r1: Arc<dyn Registry>,
    read_policy: ReadPolicy,
}

impl Unifier {
    pub fn new(r0: Arc<dyn Registry>, r1: Arc<dyn Registry>, read_policy: ReadPolicy) -> Self {
        Self { r0, r1, read_policy }
    }
}

#[async_trait]
impl Registry for Unifier {
    async fn get_blob(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        race(self.read_policy, self.r0.get_blob(repo, digest), self.r1.get_blob(repo, digest)).await
    }

    async fn get_blob_range(&self, repo: &str, digest: &Digest, start: i64, end: i64) -> Result<ByteStream> {
        race(
            self.read_policy,
            self.r0.get_blob_range(repo, digest, start, end),
            self.r1.get_blob_range(repo, digest, start, end),
        )
        .await
    }

    async fn get_manifest(&self, repo: &str, digest: &Digest) -> Result<ByteStream> {
        race(self.read_policy, self.r0.get_manifest(repo, digest), self.r1.get_manifest(repo, digest)).await
    }

    async fn get_tag(&self, repo: &str, tag: &str) -> Result<ByteStream> {
        // The tag itself must agree between the two sides before we
        // hand back either body.
        let (d0, d1) =
            tokio::join!(self.r0.resolve_tag(repo, tag), self.r1.resolve_tag(repo, tag));
        match (d0, d1) {
            (Ok(left), Ok(right)) if left.digest != right.digest => Err(ComposeError::TagConflict {
                repo: repo.to_string(),
                tag: tag.to_string(),
                left: left.digest.to_string(),
                right: right.digest.to_string(),
            }
            .into()),
            _ => race(self.read_policy, self.r0.get_tag(repo, tag), self.r1.get_tag(repo, tag)).await,
        }
    }

    async fn resolve_blob(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        race(self.read_policy, self.r0.resolve_blob(repo, digest), self.r1.resolve_blob(repo, digest)).await
    }

    async fn resolve_manifest(&self, repo: &str, digest: &Digest) -> Result<Descriptor> {
        race(
            self.read_policy,
            self.r0.resolve_manifest(repo, digest),
            self.r1.resolve_manifest(repo, digest),
        )
        .await
    }

    async fn resolve_tag(&self, repo: &str, tag: &str) -> Result<Descriptor> {
        let (d0, d1) =
            tokio::join!(self.r0.resolve_tag(repo, tag), self.r1.resolve_tag(repo, tag));
        match (d0, d1) {
            (Ok(left), Ok(right)) => {
                if left.digest != right.digest {
                    return Err(ComposeError::TagConflict {
                        repo: repo.to_string(),
                        tag: tag.to_string(),
                        left: left.digest.to_string(),
                        right: right.digest.to_string(),
                    }
                    .into());
                }
                Ok(left)
            }
            (Ok(left), Err(_)) => Ok(left),
            (Err(_), Ok(right)) => Ok(right),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn push_blob(&self, repo: &str, provisional: &Descriptor, mut reader: ByteStream) -> Result<Descriptor> {
        // Buffer once, then stream an independent copy to each side
        // concurrently -- the moral equivalent of teeing the source
        // reader through a pair of pipes without holding a live
        // connection open on both destinations at once.
        let mut buf = bytes::BytesMut::new();
        while let Some(chunk) = reader.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let bytes = buf.freeze();
        let single = |b: Bytes| -> ByteStream { Box::pin(futures::stream::once(async move { Ok(b) })) };

        let (res0, res1) = tokio::join!(
            self.r0.push_blob(repo, provisional, single(bytes.clone())),
            self.r1.push_blob(repo, provisional, single(bytes))
        );
        match (res0, res1) {
            (Ok(d0), Ok(_)) => Ok(d0),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => Err(asymmetry(&format!("push_blob: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn push_blob_chunked(&self, repo: &str, chunk_size: usize) -> Result<Box<dyn BlobWriter>> {
        let (w0, w1) = tokio::join!(self.r0.push_blob_chunked(repo, chunk_size), self.r1.push_blob_chunked(repo, chunk_size));
        let (w0, w1) = match (w0, w1) {
            (Ok(w0), Ok(w1)) => (w0, w1),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => return Err(asymmetry(&format!("push_blob_chunked: {e}"))),
            (Err(e0), Err(_)) => return Err(e0),
        };
        Ok(Box::new(UnifiedBlobWriter::new(w0, w1)))
    }

    async fn push_blob_chunked_resume(
        &self,
        repo: &str,
        id: &str,
        offset: i64,
        chunk_size: usize,
    ) -> Result<Box<dyn BlobWriter>> {
        let [id0, id1] = decode_pair_id(id)?;
        let (w0, w1) = tokio::join!(
            self.r0.push_blob_chunked_resume(repo, &id0, offset, chunk_size),
            self.r1.push_blob_chunked_resume(repo, &id1, offset, chunk_size)
        );
        let (w0, w1) = match (w0, w1) {
            (Ok(w0), Ok(w1)) => (w0, w1),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => return Err(asymmetry(&format!("push_blob_chunked_resume: {e}"))),
            (Err(e0), Err(_)) => return Err(e0),
        };
        if w0.size() != w1.size() {
            return Err(asymmetry(&format!(
                "resumed sessions diverged: {} bytes vs {} bytes",
                w0.size(),
                w1.size()
            )));
        }
        Ok(Box::new(UnifiedBlobWriter::new(w0, w1)))
    }

    async fn mount_blob(&self, from_repo: &str, to_repo: &str, digest: &Digest) -> Result<Descriptor> {
        let (res0, res1) = tokio::join!(
            self.r0.mount_blob(from_repo, to_repo, digest),
            self.r1.mount_blob(from_repo, to_repo, digest)
        );
        match (res0, res1) {
            (Ok(d0), Ok(_)) => Ok(d0),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => Err(asymmetry(&format!("mount_blob: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn push_manifest(
        &self,
        repo: &str,
        tag: Option<&str>,
        bytes: Bytes,
        media_type: Option<&str>,
    ) -> Result<Descriptor> {
        let (res0, res1) = tokio::join!(
            self.r0.push_manifest(repo, tag, bytes.clone(), media_type),
            self.r1.push_manifest(repo, tag, bytes, media_type)
        );
        match (res0, res1) {
            (Ok(d0), Ok(_)) => Ok(d0),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => Err(asymmetry(&format!("push_manifest: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn delete_blob(&self, repo: &str, digest: &Digest) -> Result<()> {
        let (res0, res1) = tokio::join!(self.r0.delete_blob(repo, digest), self.r1.delete_blob(repo, digest));
        match (res0, res1) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(e)) | (Err(e), Ok(())) => Err(asymmetry(&format!("delete_blob: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn delete_manifest(&self, repo: &str, digest: &Digest) -> Result<()> {
        let (res0, res1) =
            tokio::join!(self.r0.delete_manifest(repo, digest), self.r1.delete_manifest(repo, digest));
        match (res0, res1) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(e)) | (Err(e), Ok(())) => Err(asymmetry(&format!("delete_manifest: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn delete_tag(&self, repo: &str, tag: &str) -> Result<()> {
        let (res0, res1) = tokio::join!(self.r0.delete_tag(repo, tag), self.r1.delete_tag(repo, tag));
        match (res0, res1) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(e)) | (Err(e), Ok(())) => Err(asymmetry(&format!("delete_tag: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn repositories(&self, start_after: Option<&str>) -> Result<Paged<String>> {
        let (r0, r1) = tokio::join!(self.r0.repositories(start_after), self.r1.repositories(start_after));
        merge_listing(r0, r1, |s: &String| s.clone()).await
    }

    async fn tags(&self, repo: &str, start_after: Option<&str>) -> Result<Paged<String>> {
        let (r0, r1) = tokio::join!(self.r0.tags(repo, start_after), self.r1.tags(repo, start_after));
        merge_listing(r0, r1, |s: &String| s.clone()).await
    }

    async fn referrers(&self, repo: &str, digest: &Digest, artifact_type: Option<&str>) -> Result<Paged<Descriptor>> {
        let (r0, r1) = tokio::join!(
            self.r0.referrers(repo, digest, artifact_type),
            self.r1.referrers(repo, digest, artifact_type)
        );
        merge_listing(r0, r1, |d: &Descriptor| d.digest.clone()).await
    }
}

#[derive(Serialize, Deserialize)]
struct PairId(String, String);

fn encode_pair_id(id0: &str, id1: &str) -> String {
    use base64::Engine;
    let json = serde_json::to_vec(&PairId(id0.to_string(), id1.to_string())).expect("PairId always serializes");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
}

fn decode_pair_id(id: &str) -> Result<[String; 2]> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(id)
        .map_err(|e| Error::with_message(DistributionErrorCode::BlobUploadUnknown, format!("malformed unified upload id: {e}")))?;
    let pair: PairId = serde_json::from_slice(&bytes)
        .map_err(|e| Error::with_message(DistributionErrorCode::BlobUploadUnknown, format!("malformed unified upload id: {e}")))?;
    Ok([pair.0, pair.1])
}

/// A [`BlobWriter`] over two underlying sessions whose sizes must stay
/// equal. The resume token is `base64url(json([id0, id1]))`, decoded
/// back into the pair by [`Unifier::push_blob_chunked_resume`].
struct UnifiedBlobWriter {
    w0: Box<dyn BlobWriter>,
    w1: Box<dyn BlobWriter>,
    id: String,
}

impl UnifiedBlobWriter {
    fn new(w0: Box<dyn BlobWriter>, w1: Box<dyn BlobWriter>) -> Self {
        let id = encode_pair_id(w0.id(), w1.id());
        Self { w0, w1, id }
    }
}

#[async_trait]
impl BlobWriter for UnifiedBlobWriter {
    async fn write(&mut self, bytes: Bytes) -> Result<()> {
        let (res0, res1) = tokio::join!(self.w0.write(bytes.clone()), self.w1.write(bytes));
        match (res0, res1) {
            (Ok(()), Ok(())) => {}
            (Ok(()), Err(e)) | (Err(e), Ok(())) => return Err(asymmetry(&format!("chunked write: {e}"))),
            (Err(e0), Err(_)) => return Err(e0),
        }
        if self.w0.size() != self.w1.size() {
            return Err(asymmetry(&format!(
                "chunked sessions diverged after write: {} bytes vs {} bytes",
                self.w0.size(),
                self.w1.size()
            )));
        }
        Ok(())
    }

    fn size(&self) -> i64 {
        self.w0.size()
    }

    fn chunk_size(&self) -> usize {
        self.w0.chunk_size().max(self.w1.chunk_size())
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn commit(self: Box<Self>, expected: &Digest) -> Result<Descriptor> {
        let Self { w0, w1, .. } = *self;
        let (res0, res1) = tokio::join!(w0.commit(expected), w1.commit(expected));
        match (res0, res1) {
            (Ok(d0), Ok(_)) => Ok(d0),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => Err(asymmetry(&format!("chunked commit: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn cancel(self: Box<Self>) -> Result<()> {
        let Self { w0, w1, .. } = *self;
        let (res0, res1) = tokio::join!(w0.cancel(), w1.cancel());
        match (res0, res1) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(e)) | (Err(e), Ok(())) => Err(asymmetry(&format!("chunked cancel: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self { w0, w1, .. } = *self;
        let (res0, res1) = tokio::join!(w0.close(), w1.close());
        match (res0, res1) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(e)) | (Err(e), Ok(())) => Err(asymmetry(&format!("chunked close: {e}"))),
            (Err(e0), Err(_)) => Err(e0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ocireg_memory::MemoryRegistry;

    fn unifier(policy: ReadPolicy) -> (Unifier, Arc<MemoryRegistry>, Arc<MemoryRegistry>) {
        let r0 = Arc::new(MemoryRegistry::default());
        let r1 = Arc::new(MemoryRegistry::default());
        (Unifier::new(r0.clone(), r1.clone(), policy), r0, r1)
    }

    fn single(bytes: &'static [u8]) -> ByteStream {
        Box::pin(futures::stream::once(async move { Ok(Bytes::from_static(bytes)) }))
    }

    #[tokio::test]
    async fn push_blob_lands_on_both_backends() {
        let (u, r0, r1) = unifier(ReadPolicy::Sequential);
        let bytes = Bytes::from_static(b"hello world");
        let digest = Digest::of(&bytes);
        let provisional = Descriptor::new("application/octet-stream", digest.clone(), bytes.len() as i64);

        u.push_blob("foo/bar", &provisional, single(b"hello world")).await.unwrap();

        r0.get_blob("foo/bar", &digest).await.unwrap();
        r1.get_blob("foo/bar", &digest).await.unwrap();
    }

    #[tokio::test]
    async fn tag_conflict_is_reported() {
        let (u, r0, r1) = unifier(ReadPolicy::Sequential);
        let m0 = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{"mediaType":"application/vnd.oci.empty.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2},"layers":[]}"#;
        let m1 = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{"mediaType":"application/vnd.oci.empty.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2},"layers":[],"annotations":{"x":"y"}}"#;

        r0.push_manifest("repo", Some("t"), Bytes::from_static(m0), None).await.unwrap();
        r1.push_manifest("repo", Some("t"), Bytes::from_static(m1), None).await.unwrap();

        let err = u.resolve_tag("repo", "t").await.unwrap_err();
        assert!(err.is_code(DistributionErrorCode::Unknown));
    }

    #[tokio::test]
    async fn repositories_merge_and_dedup() {
        let (u, r0, r1) = unifier(ReadPolicy::Concurrent);
        let bytes = Bytes::from_static(b"x");
        let digest = Digest::of(&bytes);
        let provisional = Descriptor::new("application/octet-stream", digest, bytes.len() as i64);
        r0.push_blob("a", &provisional, single(b"x")).await.unwrap();
        r0.push_blob("b", &provisional, single(b"x")).await.unwrap();
        r1.push_blob("b", &provisional, single(b"x")).await.unwrap();
        r1.push_blob("c", &provisional, single(b"x")).await.unwrap();

        let names = collect_all(u.repositories(None).await.unwrap()).await.unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn chunked_upload_resume_round_trip() {
        let (u, _r0, _r1) = unifier(ReadPolicy::Sequential);
        let mut w = u.push_blob_chunked("foo", 0).await.unwrap();
        w.write(Bytes::from_static(b"hello ")).await.unwrap();
        let id = w.id().to_string();
        assert_eq!(w.size(), 6);

        let mut resumed = u.push_blob_chunked_resume("foo", &id, 6, 0).await.unwrap();
        resumed.write(Bytes::from_static(b"world")).await.unwrap();
        let bytes = Bytes::from_static(b"hello world");
        let descriptor = resumed.commit(&Digest::of(&bytes)).await.unwrap();
        assert_eq!(descriptor.size, 11);
    }
}
