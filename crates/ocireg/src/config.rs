use serde::Deserialize;

/// Top-level `ocireg` configuration, loaded from YAML (mirrors the
/// `Config`/`RepositoryBackend` split of the server this crate wraps).
#[derive(Deserialize)]
pub struct Config {
    pub backend: Backend,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub static_repositories: Option<Vec<String>>,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

fn default_listen_address() -> String {
    "0.0.0.0:13030".to_string()
}

#[derive(Deserialize)]
#[serde(tag = "type")]
pub enum Backend {
    Memory(MemoryBackendConfig),
    Unified(UnifiedBackendConfig),
}

#[derive(Deserialize, Default)]
pub struct MemoryBackendConfig {
    #[serde(default)]
    pub immutable_tags: bool,
    #[serde(default)]
    pub lax_child_references: bool,
}

/// A two-way mirror of two remote registries.
#[derive(Deserialize)]
pub struct UnifiedBackendConfig {
    pub remote_0: RemoteConfig,
    pub remote_1: RemoteConfig,
    #[serde(default)]
    pub read_policy: ReadPolicyConfig,
}

#[derive(Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
}

#[derive(Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadPolicyConfig {
    #[default]
    Sequential,
    Concurrent,
}

impl From<ReadPolicyConfig> for ocireg_compose::ReadPolicy {
    fn from(p: ReadPolicyConfig) -> Self {
        match p {
            ReadPolicyConfig::Sequential => ocireg_compose::ReadPolicy::Sequential,
            ReadPolicyConfig::Concurrent => ocireg_compose::ReadPolicy::Concurrent,
        }
    }
}

/// The server-configuration surface, minus the two
/// policy-function fields of [`ocireg_http::ServerConfig`] -- those
/// are programmatic extension points, not something a YAML file can
/// express.
#[derive(Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub disable_referrers_api: bool,
    #[serde(default)]
    pub disable_referrers_filtering: bool,
    #[serde(default)]
    pub disable_single_post_upload: bool,
    #[serde(default)]
    pub max_list_page_size: Option<i64>,
    #[serde(default)]
    pub omit_digest_from_tag_get_response: bool,
    #[serde(default)]
    pub omit_link_header_from_responses: bool,
}

impl From<ServerConfig> for ocireg_http::ServerConfig {
    fn from(f: ServerConfig) -> Self {
        ocireg_http::ServerConfig {
            disable_referrers_api: f.disable_referrers_api,
            disable_referrers_filtering: f.disable_referrers_filtering,
            disable_single_post_upload: f.disable_single_post_upload,
            max_list_page_size: f.max_list_page_size,
            omit_digest_from_tag_get_response: f.omit_digest_from_tag_get_response,
            omit_link_header_from_responses: f.omit_link_header_from_responses,
            location_for_upload_id: None,
            locations_for_descriptor: None,
        }
    }
}
