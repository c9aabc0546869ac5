use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::Error;

/// `{mediaType, digest, size}` plus the optional fields the
/// distribution-spec and image-spec layer on top: `artifactType`,
/// `annotations`, and `subject` (a nested descriptor pointing at
/// another manifest this one annotates).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: Digest,
    pub size: i64,
    #[serde(rename = "artifactType", default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Box<Descriptor>>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: i64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            artifact_type: None,
            annotations: None,
            subject: None,
        }
    }

    /// A descriptor is valid iff its media type is non-empty and, when
    /// it describes bytes in hand, the size and digest match them.
    pub fn validate_against(&self, bytes: &[u8]) -> Result<(), Error> {
        if self.media_type.is_empty() {
            return Err(Error::with_message(
                crate::error::DistributionErrorCode::ManifestInvalid,
                "descriptor media type must not be empty",
            ));
        }
        if self.size != bytes.len() as i64 {
            return Err(Error::new(crate::error::DistributionErrorCode::SizeInvalid));
        }
        let computed = Digest::of(bytes);
        if computed != self.digest {
            return Err(Error::invalid_digest(format!(
                "expected {}, computed {}",
                self.digest, computed
            )));
        }
        Ok(())
    }
}

/// An image manifest or image index, kept both as parsed JSON (for
/// reference-walking) and as the exact bytes received (for storage
/// and re-serving byte-for-byte).
#[derive(Clone, Debug)]
pub struct ManifestSpec {
    pub media_type: Option<String>,
    pub artifact_type: Option<String>,
    pub annotations: Option<HashMap<String, String>>,
    pub subject: Option<Descriptor>,
    pub config: Option<Descriptor>,
    pub layers: Vec<Descriptor>,
    pub manifests: Vec<Descriptor>,
    pub kind: ManifestKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestKind {
    Image,
    Index,
    Other,
}

pub const MEDIA_TYPE_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const MEDIA_TYPE_EMPTY_JSON: &str = "application/vnd.oci.empty.v1+json";

#[derive(Deserialize)]
struct RawManifest {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    #[serde(rename = "artifactType", default)]
    artifact_type: Option<String>,
    #[serde(default)]
    annotations: Option<HashMap<String, String>>,
    #[serde(default)]
    subject: Option<Descriptor>,
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
    #[serde(default)]
    manifests: Vec<Descriptor>,
}

impl TryFrom<&[u8]> for ManifestSpec {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: RawManifest = serde_json::from_slice(bytes).map_err(|e| {
            Error::with_message(
                crate::error::DistributionErrorCode::ManifestInvalid,
                format!("unable to deserialize manifest: {e}"),
            )
        })?;

        let kind = if !raw.manifests.is_empty()
            || raw.media_type.as_deref() == Some(MEDIA_TYPE_IMAGE_INDEX)
        {
            ManifestKind::Index
        } else if raw.config.is_some() || raw.media_type.as_deref() == Some(MEDIA_TYPE_IMAGE_MANIFEST) {
            ManifestKind::Image
        } else {
            ManifestKind::Other
        };

        Ok(ManifestSpec {
            media_type: raw.media_type,
            artifact_type: raw.artifact_type,
            annotations: raw.annotations,
            subject: raw.subject,
            config: raw.config,
            layers: raw.layers,
            manifests: raw.manifests,
            kind,
        })
    }
}

impl ManifestSpec {
    pub fn set_media_type(&mut self, media_type: impl Into<String>) {
        self.media_type = Some(media_type.into());
    }

    /// Infer the media type when the client omitted both `mediaType`
    /// and `Content-Type`, following the rule from the image-spec: a
    /// manifest with a `config` whose own media type is the standard
    /// image config is an image manifest; one naming `manifests` is
    /// an index.
    pub fn infer_media_type(&mut self) -> Result<(), Error> {
        match self.kind {
            ManifestKind::Index => {
                self.set_media_type(MEDIA_TYPE_IMAGE_INDEX);
                Ok(())
            }
            ManifestKind::Image => {
                if let Some(config) = &self.config {
                    if self.artifact_type.is_none() && config.media_type == MEDIA_TYPE_EMPTY_JSON {
                        return Err(Error::new(crate::error::DistributionErrorCode::ManifestInvalid));
                    }
                }
                self.set_media_type(MEDIA_TYPE_IMAGE_MANIFEST);
                Ok(())
            }
            ManifestKind::Other => Err(Error::new(crate::error::DistributionErrorCode::ManifestInvalid)),
        }
    }
}
