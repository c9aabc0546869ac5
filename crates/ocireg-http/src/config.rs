//! The server-configuration surface: a set of
//! effect toggles plus two optional policy functions for redirecting
//! clients to alternate locations.

use ocireg_core::Descriptor;

/// Computes an external URL that should receive upload continuations
/// for a given opaque upload id, in place of this server's own
/// `/v2/<repo>/blobs/uploads/<id>` path.
pub type UploadLocationFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Computes zero or more alternate download URLs for a descriptor.
/// When non-empty, successful resolves emit one of these as
/// `Location` and GETs may issue a 307 redirect instead of streaming.
pub type DescriptorLocationFn = Box<dyn Fn(bool, &Descriptor) -> Vec<String> + Send + Sync>;

/// Server-wide behavior toggles ("server configuration
/// surface").
pub struct ServerConfig {
    pub disable_referrers_api: bool,
    pub disable_referrers_filtering: bool,
    pub disable_single_post_upload: bool,
    pub max_list_page_size: Option<i64>,
    pub omit_digest_from_tag_get_response: bool,
    pub omit_link_header_from_responses: bool,
    pub location_for_upload_id: Option<UploadLocationFn>,
    pub locations_for_descriptor: Option<DescriptorLocationFn>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            disable_referrers_api: false,
            disable_referrers_filtering: false,
            disable_single_post_upload: false,
            max_list_page_size: None,
            omit_digest_from_tag_get_response: false,
            omit_link_header_from_responses: false,
            location_for_upload_id: None,
            locations_for_descriptor: None,
        }
    }
}

impl ServerConfig {
    pub fn upload_location(&self, repo: &str, id: &str) -> String {
        match &self.location_for_upload_id {
            Some(f) => f(id),
            None => format!("/v2/{repo}/blobs/uploads/{}", ocireg_core::encode_upload_id(id)),
        }
    }

    pub fn descriptor_locations(&self, is_manifest: bool, desc: &Descriptor) -> Vec<String> {
        match &self.locations_for_descriptor {
            Some(f) => f(is_manifest, desc),
            None => Vec::new(),
        }
    }
}
