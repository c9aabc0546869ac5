//! Synthetic image fixtures for exercising a [`Registry`]
//! implementation, in the spirit of `oci-distribution-test`'s
//! `{Layer, Image, Index}` builders. Since
//! `ocireg-core` reads and writes manifests as raw JSON rather than
//! through a typed image-spec crate, these builders assemble the
//! same JSON by hand and keep the exact bytes alongside the parsed
//! descriptor so callers can push byte-for-byte what a real client
//! would send.

use bytes::Bytes;
use derive_builder::Builder;
use serde_json::json;

use ocireg_core::registry::Registry;
use ocireg_core::{
    Descriptor, Digest, MEDIA_TYPE_IMAGE_CONFIG, MEDIA_TYPE_IMAGE_INDEX, MEDIA_TYPE_IMAGE_MANIFEST,
};

use crate::errors::{Error, Result};

const MEDIA_TYPE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

fn descriptor_json(d: &Descriptor) -> serde_json::Value {
    serde_json::to_value(d).expect("Descriptor always serializes")
}

/// A single content-addressed layer blob.
#[derive(Builder, Clone)]
#[builder(build_fn(skip))]
pub struct Layer {
    pub data: Bytes,
    #[builder(setter(skip))]
    pub descriptor: Descriptor,
}

impl LayerBuilder {
    pub fn build(self) -> Result<Layer> {
        let data = self.data.ok_or_else(|| Error::LayerBuilderError("must include data to construct Layer".to_string()))?;
        let digest = Digest::of(&data);
        let descriptor = Descriptor::new(MEDIA_TYPE_LAYER, digest, data.len() as i64);
        Ok(Layer { data, descriptor })
    }
}

impl Layer {
    pub fn builder() -> LayerBuilder {
        LayerBuilder::default()
    }

    pub async fn push(&self, registry: &dyn Registry, repo: &str) -> Result<Descriptor> {
        let reader = crate::single_chunk(self.data.clone());
        registry.push_blob(repo, &self.descriptor, reader).await.map_err(Error::from)
    }
}

/// A config blob plus layers, assembled into an image manifest.
#[derive(Builder, Clone)]
#[builder(build_fn(skip))]
pub struct Image {
    #[builder(default)]
    pub layers: Vec<Layer>,
    #[builder(setter(strip_option), default)]
    pub artifact_type: Option<String>,
    #[builder(setter(strip_option), default)]
    pub subject: Option<Descriptor>,

    #[builder(setter(skip))]
    pub config: Bytes,
    #[builder(setter(skip))]
    pub config_descriptor: Descriptor,
    #[builder(setter(skip))]
    pub manifest: Bytes,
    #[builder(setter(skip))]
    pub descriptor: Descriptor,
}

impl ImageBuilder {
    pub fn build(self) -> Result<Image> {
        let layers = self.layers.flatten().unwrap_or_default();
        let artifact_type = self.artifact_type.flatten();
        let subject = self.subject.flatten();

        let config = Bytes::from(serde_json::to_vec(&json!({"architecture": "amd64", "os": "linux"}))?);
        let config_digest = Digest::of(&config);
        let config_descriptor = Descriptor::new(MEDIA_TYPE_IMAGE_CONFIG, config_digest, config.len() as i64);

        let mut body = json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_IMAGE_MANIFEST,
            "config": descriptor_json(&config_descriptor),
            "layers": layers.iter().map(|l| descriptor_json(&l.descriptor)).collect::<Vec<_>>(),
        });
        if let Some(at) = &artifact_type {
            body["artifactType"] = json!(at);
        }
        if let Some(s) = &subject {
            body["subject"] = descriptor_json(s);
        }

        let manifest = Bytes::from(serde_json::to_vec(&body)?);
        let digest = Digest::of(&manifest);
        let mut descriptor = Descriptor::new(MEDIA_TYPE_IMAGE_MANIFEST, digest, manifest.len() as i64);
        descriptor.artifact_type = artifact_type.clone();
        descriptor.subject = subject.clone().map(Box::new);

        Ok(Image { layers, artifact_type, subject, config, config_descriptor, manifest, descriptor })
    }
}

impl Image {
    pub fn builder() -> ImageBuilder {
        ImageBuilder::default()
    }

    /// Pushes the config blob, every layer, then the manifest itself
    /// (optionally tagging it), in the order a real client would.
    pub async fn push(&self, registry: &dyn Registry, repo: &str, tag: Option<&str>) -> Result<Descriptor> {
        registry
            .push_blob(repo, &self.config_descriptor, crate::single_chunk(self.config.clone()))
            .await
            .map_err(Error::from)?;
        for layer in &self.layers {
            layer.push(registry, repo).await?;
        }
        registry
            .push_manifest(repo, tag, self.manifest.clone(), Some(MEDIA_TYPE_IMAGE_MANIFEST))
            .await
            .map_err(Error::from)
    }
}

/// An image index referencing a set of [`Image`]s by descriptor.
#[derive(Builder)]
#[builder(build_fn(skip))]
pub struct Index {
    #[builder(default)]
    pub manifests: Vec<Image>,
    #[builder(setter(strip_option), default)]
    pub artifact_type: Option<String>,
    #[builder(setter(strip_option), default)]
    pub subject: Option<Descriptor>,

    #[builder(setter(skip))]
    pub index: Bytes,
    #[builder(setter(skip))]
    pub descriptor: Descriptor,
}

impl IndexBuilder {
    pub fn build(self) -> Result<Index> {
        let manifests = self.manifests.flatten().unwrap_or_default();
        let artifact_type = self.artifact_type.flatten();
        let subject = self.subject.flatten();

        let mut body = json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_IMAGE_INDEX,
            "manifests": manifests.iter().map(|m| descriptor_json(&m.descriptor)).collect::<Vec<_>>(),
        });
        if let Some(at) = &artifact_type {
            body["artifactType"] = json!(at);
        }
        if let Some(s) = &subject {
            body["subject"] = descriptor_json(s);
        }

        let index = Bytes::from(serde_json::to_vec(&body)?);
        let digest = Digest::of(&index);
        let mut descriptor = Descriptor::new(MEDIA_TYPE_IMAGE_INDEX, digest, index.len() as i64);
        descriptor.artifact_type = artifact_type.clone();
        descriptor.subject = subject.clone().map(Box::new);

        Ok(Index { manifests, artifact_type, subject, index, descriptor })
    }
}

impl Index {
    pub fn builder() -> IndexBuilder {
        IndexBuilder::default()
    }

    pub async fn push(&self, registry: &dyn Registry, repo: &str, tag: Option<&str>) -> Result<Descriptor> {
        for image in &self.manifests {
            image.push(registry, repo, None).await?;
        }
        registry
            .push_manifest(repo, tag, self.index.clone(), Some(MEDIA_TYPE_IMAGE_INDEX))
            .await
            .map_err(Error::from)
    }
}
