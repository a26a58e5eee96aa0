use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetraceConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Debounce windows and assertion timeouts used while recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_typing_flush_ms")]
    pub typing_flush_ms: u64,
    #[serde(default = "default_scroll_debounce_ms")]
    pub scroll_debounce_ms: u64,
    #[serde(default = "default_click_dedupe_ms")]
    pub click_dedupe_ms: u64,
    #[serde(default = "default_menu_assert_timeout_ms")]
    pub menu_assert_timeout_ms: u64,
    /// Largest gap, in seconds, across which consecutive typing into one field is merged.
    #[serde(default = "default_merge_gap_secs")]
    pub merge_gap_secs: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            typing_flush_ms: default_typing_flush_ms(),
            scroll_debounce_ms: default_scroll_debounce_ms(),
            click_dedupe_ms: default_click_dedupe_ms(),
            menu_assert_timeout_ms: default_menu_assert_timeout_ms(),
            merge_gap_secs: default_merge_gap_secs(),
        }
    }
}

impl CaptureConfig {
    pub fn typing_flush(&self) -> Duration {
        Duration::from_millis(self.typing_flush_ms)
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn click_dedupe(&self) -> Duration {
        Duration::from_millis(self.click_dedupe_ms)
    }
}

fn default_typing_flush_ms() -> u64 {
    200
}

fn default_scroll_debounce_ms() -> u64 {
    120
}

fn default_click_dedupe_ms() -> u64 {
    250
}

fn default_menu_assert_timeout_ms() -> u64 {
    3000
}

fn default_merge_gap_secs() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "default_element_timeout_ms")]
    pub element_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,
    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: u64,
    #[serde(default = "default_menu_wait_ms")]
    pub menu_wait_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            element_timeout_ms: default_element_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            typing_delay_ms: default_typing_delay_ms(),
            highlight_ms: default_highlight_ms(),
            menu_wait_ms: default_menu_wait_ms(),
        }
    }
}

fn default_element_timeout_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_typing_delay_ms() -> u64 {
    50
}

fn default_highlight_ms() -> u64 {
    200
}

fn default_menu_wait_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}
