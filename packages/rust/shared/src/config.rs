//! Application configuration for mfdocs.
//!
//! User config lives at `~/.mfdocs/mfdocs.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MfDocsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mfdocs.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mfdocs";

// ---------------------------------------------------------------------------
// Config structs (matching mfdocs.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Output and progress locations.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Regulator portal endpoints.
    #[serde(default)]
    pub portal: PortalConfig,

    /// Browser launch settings.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Settle delays and bounded waits.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Direct-download HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory that receives the PDFs.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Path of the resume checkpoint file.
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            checkpoint_file: default_checkpoint_file(),
        }
    }
}

fn default_download_dir() -> String {
    "downloads".into()
}
fn default_checkpoint_file() -> String {
    "download_progress.json".into()
}

/// `[portal]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Mutual-fund listing endpoint; `mftype=<code>` is appended per document type.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Fund-type code of the KIM listing.
    #[serde(default = "default_kim_fund_type")]
    pub kim_fund_type: u32,

    /// Fund-type code of the SID listing.
    #[serde(default = "default_sid_fund_type")]
    pub sid_fund_type: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            kim_fund_type: default_kim_fund_type(),
            sid_fund_type: default_sid_fund_type(),
        }
    }
}

fn default_listing_url() -> String {
    "https://www.sebi.gov.in/sebiweb/other/OtherAction.do?doMutualFund=yes".into()
}
fn default_kim_fund_type() -> u32 {
    3
}
fn default_sid_fund_type() -> u32 {
    2
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run Chrome without a visible window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Explicit Chrome/Chromium executable; auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    /// Window width in pixels.
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    /// Window height in pixels.
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_window_width() -> u32 {
    1920
}
fn default_window_height() -> u32 {
    1080
}

/// `[timing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Upper bound on waiting for a listing table to render.
    #[serde(default = "default_structure_timeout")]
    pub structure_timeout_secs: u64,

    /// Delay after a click for same-tab navigation or a new tab.
    #[serde(default = "default_settle_ms")]
    pub tab_settle_ms: u64,

    /// Extra delay for the fund detail page to render asynchronously.
    #[serde(default = "default_settle_ms")]
    pub detail_render_ms: u64,

    /// Delay after clicking the download trigger.
    #[serde(default = "default_settle_ms")]
    pub download_settle_ms: u64,

    /// Poll interval for bounded waits.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long to watch the download directory after a browser download
    /// click. `0` trusts the click without verification.
    #[serde(default = "default_download_wait")]
    pub download_wait_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            structure_timeout_secs: default_structure_timeout(),
            tab_settle_ms: default_settle_ms(),
            detail_render_ms: default_settle_ms(),
            download_settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval(),
            download_wait_secs: default_download_wait(),
        }
    }
}

fn default_structure_timeout() -> u64 {
    20
}
fn default_settle_ms() -> u64 {
    3000
}
fn default_poll_interval() -> u64 {
    250
}
fn default_download_wait() -> u64 {
    30
}

impl TimingConfig {
    /// All delays zero; used by tests driving fake pages.
    pub fn immediate() -> Self {
        Self {
            structure_timeout_secs: 0,
            tab_settle_ms: 0,
            detail_render_ms: 0,
            download_settle_ms: 0,
            poll_interval_ms: 1,
            download_wait_secs: 0,
        }
    }

    pub fn structure_timeout(&self) -> Duration {
        Duration::from_secs(self.structure_timeout_secs)
    }

    pub fn tab_settle(&self) -> Duration {
        Duration::from_millis(self.tab_settle_ms)
    }

    pub fn detail_render(&self) -> Duration {
        Duration::from_millis(self.detail_render_ms)
    }

    pub fn download_settle(&self) -> Duration {
        Duration::from_millis(self.download_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn download_wait(&self) -> Duration {
        Duration::from_secs(self.download_wait_secs)
    }
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent sent with direct PDF downloads.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout for a single document.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .into()
}
fn default_http_timeout() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for one traversal — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory that receives the PDFs.
    pub download_dir: PathBuf,
    /// Checkpoint file location.
    pub checkpoint_file: PathBuf,
    /// Portal endpoints.
    pub portal: PortalConfig,
    /// Browser launch settings.
    pub browser: BrowserConfig,
    /// Delays and waits.
    pub timing: TimingConfig,
    /// Direct-download client settings.
    pub http: HttpConfig,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            download_dir: PathBuf::from(&config.defaults.download_dir),
            checkpoint_file: PathBuf::from(&config.defaults.checkpoint_file),
            portal: config.portal.clone(),
            browser: config.browser.clone(),
            timing: config.timing.clone(),
            http: config.http.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mfdocs/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| MfDocsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mfdocs/mfdocs.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MfDocsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MfDocsError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MfDocsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MfDocsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MfDocsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
