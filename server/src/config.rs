//! Server configuration
//!
//! Configuration is loaded from environment variables once at startup and passed
//! down explicitly; nothing reads the environment after `Config::from_env`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Public base URL used for filesystem-backed artifact locators (optional)
    pub public_base_url: Option<String>,

    /// Artifact storage configuration
    pub storage: StorageConfig,

    /// Detector chain configuration
    pub detection: DetectionConfig,

    /// Overlay engine configuration
    pub overlay: OverlayConfig,

    /// Result cache configuration
    pub cache: CacheConfig,
}

/// Artifact storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for the local filesystem store
    pub root: PathBuf,
    /// Blob account URL, e.g. `https://account.blob.core.windows.net`
    pub blob_account_url: Option<String>,
    /// Blob container name
    pub blob_container: String,
    /// Shared access signature appended to blob requests
    pub blob_sas_token: Option<String>,
    /// How long the startup reachability probe may take
    pub validate_timeout: Duration,
}

/// Detector chain configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Cloud vision endpoint
    pub vision_endpoint: Option<String>,
    /// Cloud vision subscription key
    pub vision_key: Option<String>,
    /// Generative model API key
    pub gemini_api_key: Option<String>,
    /// Generative model name
    pub gemini_model: String,
    /// Timeout for the cloud vision adapter
    pub cloud_timeout: Duration,
    /// Timeout for the generative adapter
    pub generative_timeout: Duration,
    /// Processing budget for the local heuristic
    pub local_budget: Duration,
    /// Smallest accepted mask coverage (fraction of frame)
    pub min_area_ratio: f32,
    /// Largest accepted mask coverage (fraction of frame)
    pub max_area_ratio: f32,
    /// Allowed relative aspect-ratio difference between mask and image
    pub aspect_tolerance: f32,
}

/// Overlay engine configuration
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Directory holding covering texture bitmaps
    pub textures_dir: PathBuf,
    /// How strongly textures are pulled toward the requested color (0-1)
    pub tint_strength: f32,
    /// Opacity of the covering inside a fully-set mask pixel (0-1)
    pub opacity: f32,
}

/// Result cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries per cache
    pub max_entries: u64,
    /// Time-to-live for cache entries
    pub ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_base_url: None,
            storage: StorageConfig::default(),
            detection: DetectionConfig::default(),
            overlay: OverlayConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            blob_account_url: None,
            blob_container: "window-images".to_string(),
            blob_sas_token: None,
            validate_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            vision_endpoint: None,
            vision_key: None,
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".to_string(),
            cloud_timeout: Duration::from_millis(8_000),
            generative_timeout: Duration::from_millis(12_000),
            local_budget: Duration::from_millis(30_000),
            min_area_ratio: 0.02,
            max_area_ratio: 0.90,
            aspect_tolerance: 0.05,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            textures_dir: PathBuf::from("./textures"),
            tint_strength: 0.85,
            opacity: 0.9,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl DetectionConfig {
    /// Whether the cloud vision adapter has everything it needs
    pub fn vision_available(&self) -> bool {
        self.vision_endpoint.is_some() && self.vision_key.is_some()
    }

    /// Whether the generative adapter has everything it needs
    pub fn gemini_available(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}

/// Read a non-empty string variable
fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Some(url) = non_empty("PUBLIC_BASE_URL") {
            config.public_base_url = Some(url.trim_end_matches('/').to_string());
        }

        // Storage config
        if let Some(root) = non_empty("STORAGE_ROOT") {
            config.storage.root = PathBuf::from(root);
        }
        config.storage.blob_account_url = non_empty("BLOB_ACCOUNT_URL");
        if let Some(container) = non_empty("BLOB_CONTAINER") {
            config.storage.blob_container = container;
        }
        config.storage.blob_sas_token = non_empty("BLOB_SAS_TOKEN");

        // Detection config
        config.detection.vision_endpoint = non_empty("AZURE_VISION_ENDPOINT");
        config.detection.vision_key = non_empty("AZURE_VISION_KEY");
        config.detection.gemini_api_key = non_empty("GEMINI_API_KEY");
        if let Some(model) = non_empty("GEMINI_MODEL") {
            config.detection.gemini_model = model;
        }
        if let Ok(val) = env::var("CLOUD_DETECTOR_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.detection.cloud_timeout = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("GENERATIVE_DETECTOR_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.detection.generative_timeout = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("LOCAL_DETECTOR_BUDGET_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.detection.local_budget = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("MASK_MIN_AREA_RATIO")
            && let Ok(ratio) = val.parse()
        {
            config.detection.min_area_ratio = ratio;
        }
        if let Ok(val) = env::var("MASK_MAX_AREA_RATIO")
            && let Ok(ratio) = val.parse()
        {
            config.detection.max_area_ratio = ratio;
        }
        if let Ok(val) = env::var("MASK_ASPECT_TOLERANCE")
            && let Ok(tolerance) = val.parse()
        {
            config.detection.aspect_tolerance = tolerance;
        }

        // Overlay config
        if let Some(dir) = non_empty("TEXTURES_DIR") {
            config.overlay.textures_dir = PathBuf::from(dir);
        }
        if let Ok(val) = env::var("TINT_STRENGTH")
            && let Ok(strength) = val.parse::<f32>()
        {
            config.overlay.tint_strength = strength.clamp(0.0, 1.0);
        }
        if let Ok(val) = env::var("OVERLAY_OPACITY")
            && let Ok(opacity) = val.parse::<f32>()
        {
            config.overlay.opacity = opacity.clamp(0.0, 1.0);
        }

        // Cache config
        if let Ok(val) = env::var("CACHE_MAX_ENTRIES")
            && let Ok(n) = val.parse()
        {
            config.cache.max_entries = n;
        }
        if let Ok(val) = env::var("CACHE_TTL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.cache.ttl = Duration::from_secs(secs);
        }

        config
    }
}
