//! Persisted print settings with merge-over-defaults semantics.
//!
//! The settings live as one JSON blob under the `print/settings` key in
//! the local database. Every field carries a default, so a partially
//! populated or absent blob never yields a missing field. Settings are
//! read once per print attempt; the store never caches.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::{self, Db};
use crate::error::{PrintError, PrintResult};
use crate::formats;

const SETTINGS_CATEGORY: &str = "print";
const SETTINGS_KEY: &str = "settings";

/// Which rendering path a printer takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrinterType {
    /// Raw ESC/POS byte stream.
    #[default]
    Thermal,
    /// Rendered HTML driven through the OS print pipeline.
    Pixel,
}

/// Font-size preset for the HTML renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl FontSize {
    /// Base body size in px for the embedded print CSS.
    pub fn base_px(self) -> u32 {
        match self {
            FontSize::Small => 10,
            FontSize::Medium => 12,
            FontSize::Large => 14,
        }
    }
}

/// User-configurable print settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrintSettings {
    pub printer_type: PrinterType,
    /// Key into the paper format registry.
    pub paper_format: String,
    pub font_size: FontSize,
    pub copies: u32,
    pub auto_cut: bool,
    pub auto_print: bool,
    pub shop_name: String,
    pub shop_address: String,
    pub shop_phone: String,
    pub thank_you_message: String,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            printer_type: PrinterType::Thermal,
            paper_format: formats::DEFAULT_FORMAT.to_string(),
            font_size: FontSize::Medium,
            copies: 1,
            auto_cut: true,
            auto_print: true,
            shop_name: String::new(),
            shop_address: String::new(),
            shop_phone: String::new(),
            thank_you_message: "Thank you for your order!".to_string(),
        }
    }
}

impl PrintSettings {
    /// Clamp fields a hand-edited blob could break.
    fn normalized(mut self) -> Self {
        if self.copies == 0 {
            self.copies = 1;
        }
        self
    }
}

/// Read/write access to the persisted settings blob.
#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<Db>,
}

impl SettingsStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Load settings, merging whatever is persisted over the defaults.
    /// Absent or corrupt blobs yield full defaults.
    pub fn load(&self) -> PrintSettings {
        let raw = match self.db.conn.lock() {
            Ok(conn) => db::get_setting(&conn, SETTINGS_CATEGORY, SETTINGS_KEY),
            Err(e) => {
                warn!("settings: database lock poisoned: {e}");
                None
            }
        };

        match raw {
            Some(raw) => match serde_json::from_str::<PrintSettings>(&raw) {
                Ok(settings) => settings.normalized(),
                Err(e) => {
                    warn!("settings: stored blob unreadable, using defaults: {e}");
                    PrintSettings::default()
                }
            },
            None => PrintSettings::default(),
        }
    }

    /// Persist the full settings object.
    pub fn save(&self, settings: &PrintSettings) -> PrintResult<()> {
        let raw = serde_json::to_string(settings)
            .map_err(|e| PrintError::Settings(format!("serialize: {e}")))?;
        let conn = self
            .db
            .conn
            .lock()
            .map_err(|e| PrintError::Settings(e.to_string()))?;
        db::set_setting(&conn, SETTINGS_CATEGORY, SETTINGS_KEY, &raw)
            .map_err(PrintError::Settings)
    }
}
