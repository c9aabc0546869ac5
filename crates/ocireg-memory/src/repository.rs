//! Per-repository state: the maps of blobs, manifests, tags, and
//! upload sessions a [`crate::MemoryRegistry`] holds one of per
//! repository name.

use std::collections::{HashMap, HashSet};

use bytes::{Bytes, BytesMut};

use ocireg_core::{Descriptor, Digest, DistributionErrorCode, Error, ManifestKind, ManifestSpec};

/// A manifest as stored: the exact bytes received (re-served
/// byte-for-byte) plus the descriptor and the child references parsed
/// out of it once, so reachability checks don't re-parse JSON.
pub(crate) struct StoredManifest {
    pub bytes: Bytes,
    pub descriptor: Descriptor,
    pub config: Option<Digest>,
    pub layers: Vec<Digest>,
    pub manifests: Vec<Digest>,
}

pub(crate) struct UploadSession {
    pub id: String,
    pub buffer: BytesMut,
    pub committed: bool,
}

#[derive(Default)]
pub(crate) struct Repository {
    pub blobs: HashMap<Digest, Bytes>,
    pub manifests: HashMap<Digest, StoredManifest>,
    pub tags: HashMap<String, Descriptor>,
    pub uploads: HashMap<String, UploadSession>,
}

impl Repository {
    /// Every manifest or blob digest reachable from a tag, by walking
    /// `config`/`layers`/`manifests` references transitively. `subject`
    /// is deliberately excluded -- it is explicitly permitted to
    /// dangle and does not pin content the way a child reference
    /// does.
    pub fn protected(&self) -> (HashSet<Digest>, HashSet<Digest>) {
        let mut protected_manifests = HashSet::new();
        let mut protected_blobs = HashSet::new();
        let mut stack: Vec<Digest> = self.tags.values().map(|d| d.digest.clone()).collect();

        while let Some(digest) = stack.pop() {
            if !protected_manifests.insert(digest.clone()) {
                continue;
            }
            let Some(stored) = self.manifests.get(&digest) else {
                continue;
            };
            if let Some(config) = &stored.config {
                protected_blobs.insert(config.clone());
            }
            for layer in &stored.layers {
                protected_blobs.insert(layer.clone());
            }
            for child in &stored.manifests {
                stack.push(child.clone());
            }
        }

        (protected_manifests, protected_blobs)
    }
}

/// Validate `spec`'s child references against this repository's blob
/// and manifest maps, per the push path: every `config`/`layers`
/// entry must resolve to a stored blob, every `manifests` entry to a
/// stored manifest, unless `lax` waives it. `subject` is never
/// checked -- it may dangle unconditionally.
pub(crate) fn validate_references(repo: &Repository, spec: &ManifestSpec, lax: bool) -> Result<(), Error> {
    if lax {
        return Ok(());
    }
    match spec.kind {
        ManifestKind::Image => {
            if let Some(config) = &spec.config {
                if !repo.blobs.contains_key(&config.digest) {
                    return Err(missing_reference(&config.digest));
                }
            }
            for layer in &spec.layers {
                if !repo.blobs.contains_key(&layer.digest) {
                    return Err(missing_reference(&layer.digest));
                }
            }
            Ok(())
        }
        ManifestKind::Index => {
            for child in &spec.manifests {
                if !repo.manifests.contains_key(&child.digest) {
                    return Err(missing_reference(&child.digest));
                }
            }
            Ok(())
        }
        ManifestKind::Other => Ok(()),
    }
}

fn missing_reference(digest: &Digest) -> Error {
    Error::with_message(
        DistributionErrorCode::ManifestBlobUnknown,
        format!("manifest references unknown digest {digest}"),
    )
}
