//! Runtime settings
//!
//! All runtime configuration lives in the `settings` key/value table. It is
//! read once into an immutable [`Settings`] value which is then handed to each
//! component's constructor; nothing reads the table behind a component's back.
//!
//! Only the keys enumerated by [`SettingKey`] are honoured. Rows with any other
//! key are reported and ignored, so the table cannot inject arbitrary
//! behaviour.
//!
//! # Settings Sources Priority
//!
//! 1. `settings` table row
//! 2. Built-in default (written back to the table when missing)

use crate::notify::{NotificationConfig, SendCondition};
use crate::reporting::ReportingSettings;
use crate::session::SessionSettings;
use crate::validator::ValidationPolicy;
use crate::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Built-in notification template; every placeholder is used once
pub const DEFAULT_EMAIL_TEMPLATE: &str = concat!(
    "<h2>Checklist #[RECORD_ID]</h2>",
    "<p>Contrôle effectué par <strong>[SUBMITTER]</strong> le [DATE].</p>",
    "<p>Résultat : <strong>[STATUS]</strong></p>",
    "<h3>Éléments manquants</h3>[MISSING_ITEMS]",
    "<h3>Éléments défaillants</h3>[FAILING_ITEMS]",
    "<h3>Commentaire</h3><p>[COMMENT]</p>",
);

/// Allow-list of externally overridable settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    AutosaveIntervalMs,
    DraftMaxAgeMinutes,
    IncompleteBlockThreshold,
    MaxCommentLength,
    TextValidationError,
    TextValidationWarning,
    EmailDestination,
    EmailSendCondition,
    EmailTemplateHtml,
    EmailRelayUrl,
    EmailSenderName,
    DisplayUtcOffsetMinutes,
    DashboardTopItems,
    DashboardRecentRecords,
}

impl SettingKey {
    pub const ALL: [SettingKey; 14] = [
        SettingKey::AutosaveIntervalMs,
        SettingKey::DraftMaxAgeMinutes,
        SettingKey::IncompleteBlockThreshold,
        SettingKey::MaxCommentLength,
        SettingKey::TextValidationError,
        SettingKey::TextValidationWarning,
        SettingKey::EmailDestination,
        SettingKey::EmailSendCondition,
        SettingKey::EmailTemplateHtml,
        SettingKey::EmailRelayUrl,
        SettingKey::EmailSenderName,
        SettingKey::DisplayUtcOffsetMinutes,
        SettingKey::DashboardTopItems,
        SettingKey::DashboardRecentRecords,
    ];

    /// Column value of `settings.key`
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::AutosaveIntervalMs => "autosave_interval_ms",
            SettingKey::DraftMaxAgeMinutes => "draft_max_age_minutes",
            SettingKey::IncompleteBlockThreshold => "incomplete_block_threshold",
            SettingKey::MaxCommentLength => "max_comment_length",
            SettingKey::TextValidationError => "text_validation_error",
            SettingKey::TextValidationWarning => "text_validation_warning",
            SettingKey::EmailDestination => "email_destination",
            SettingKey::EmailSendCondition => "email_send_condition",
            SettingKey::EmailTemplateHtml => "email_template_html",
            SettingKey::EmailRelayUrl => "email_relay_url",
            SettingKey::EmailSenderName => "email_sender_name",
            SettingKey::DisplayUtcOffsetMinutes => "display_utc_offset_minutes",
            SettingKey::DashboardTopItems => "dashboard_top_items",
            SettingKey::DashboardRecentRecords => "dashboard_recent_records",
        }
    }

    pub fn default_value(&self) -> &'static str {
        match self {
            SettingKey::AutosaveIntervalMs => "30000",
            SettingKey::DraftMaxAgeMinutes => "30",
            SettingKey::IncompleteBlockThreshold => "3",
            SettingKey::MaxCommentLength => "1000",
            SettingKey::TextValidationError => "Toute la liste doit être vérifiée.",
            SettingKey::TextValidationWarning => {
                "Les éléments suivants ne sont pas vérifiés :\n{items}"
            }
            SettingKey::EmailDestination => "",
            SettingKey::EmailSendCondition => "issues_only",
            SettingKey::EmailTemplateHtml => DEFAULT_EMAIL_TEMPLATE,
            SettingKey::EmailRelayUrl => "",
            SettingKey::EmailSenderName => "Checklist",
            SettingKey::DisplayUtcOffsetMinutes => "60",
            SettingKey::DashboardTopItems => "5",
            SettingKey::DashboardRecentRecords => "10",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == key)
    }
}

/// Immutable configuration value handed to every component
#[derive(Debug, Clone)]
pub struct Settings {
    pub session: SessionSettings,
    pub validation: ValidationPolicy,
    pub notification: NotificationConfig,
    pub reporting: ReportingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_values(&HashMap::new())
    }
}

impl Settings {
    /// Build from raw allow-listed values; missing or unparsable values fall back to defaults
    pub fn from_values(values: &HashMap<SettingKey, String>) -> Self {
        let autosave_ms: u64 = parse_or_default(values, SettingKey::AutosaveIntervalMs);
        let max_age_minutes: u64 = parse_or_default(values, SettingKey::DraftMaxAgeMinutes);
        let block_threshold: usize = parse_or_default(values, SettingKey::IncompleteBlockThreshold);
        let max_comment_length: usize = parse_or_default(values, SettingKey::MaxCommentLength);
        let utc_offset_minutes = utc_offset_or_default(values);
        let top_items: usize = parse_or_default(values, SettingKey::DashboardTopItems);
        let recent_records: usize = parse_or_default(values, SettingKey::DashboardRecentRecords);

        let send_condition = SendCondition::from_str(raw(values, SettingKey::EmailSendCondition))
            .unwrap_or_else(|_| {
                warn!(
                    "Invalid email_send_condition '{}', using default 'issues_only'",
                    raw(values, SettingKey::EmailSendCondition)
                );
                SendCondition::IssuesOnly
            });

        let destinations = raw(values, SettingKey::EmailDestination)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let relay_url = raw(values, SettingKey::EmailRelayUrl).trim();

        Self {
            session: SessionSettings {
                // Floor at 5s so a bad row cannot turn autosave into a busy loop
                autosave_interval: Duration::from_millis(autosave_ms.max(5000)),
                draft_max_age: (max_age_minutes > 0)
                    .then(|| Duration::from_secs(max_age_minutes * 60)),
                max_comment_length,
            },
            validation: ValidationPolicy {
                block_threshold: block_threshold.max(1),
                error_text: raw(values, SettingKey::TextValidationError).to_string(),
                warning_text: raw(values, SettingKey::TextValidationWarning).to_string(),
            },
            notification: NotificationConfig {
                destinations,
                send_condition,
                template: raw(values, SettingKey::EmailTemplateHtml).to_string(),
                sender_name: raw(values, SettingKey::EmailSenderName).to_string(),
                relay_url: (!relay_url.is_empty()).then(|| relay_url.to_string()),
                utc_offset_minutes,
            },
            reporting: ReportingSettings {
                top_items,
                recent_records,
                utc_offset_minutes,
            },
        }
    }

    /// Load settings from the database
    ///
    /// For each allow-listed key:
    /// 1. Read from the `settings` table
    /// 2. If NULL or missing, use the built-in default and write it back
    ///
    /// Rows outside the allow-list are logged and ignored.
    pub async fn load(db: &SqlitePool) -> Result<Self> {
        let mut values = HashMap::new();

        for key in SettingKey::ALL {
            match get_setting::<String>(db, key.as_str()).await? {
                Some(value) => {
                    values.insert(key, value);
                }
                None => {
                    info!(
                        "Setting '{}' not found in database, using default",
                        key.as_str()
                    );
                    set_setting(db, key.as_str(), key.default_value()).await?;
                }
            }
        }

        let stored_keys: Vec<String> = sqlx::query_scalar("SELECT key FROM settings")
            .fetch_all(db)
            .await?;
        for stored in stored_keys {
            if SettingKey::from_key(&stored).is_none() {
                warn!("Ignoring setting '{}': not an overridable key", stored);
            }
        }

        info!("Loaded runtime settings from database");
        Ok(Self::from_values(&values))
    }
}

fn raw(values: &HashMap<SettingKey, String>, key: SettingKey) -> &str {
    values
        .get(&key)
        .map(String::as_str)
        .unwrap_or_else(|| key.default_value())
}

/// Widest accepted display offset, one day either way
pub const MAX_UTC_OFFSET_MINUTES: i32 = 24 * 60;

fn utc_offset_or_default(values: &HashMap<SettingKey, String>) -> i32 {
    let offset: i32 = parse_or_default(values, SettingKey::DisplayUtcOffsetMinutes);
    if offset.abs() < MAX_UTC_OFFSET_MINUTES {
        return offset;
    }
    warn!(
        "Setting '{}' out of range ({} minutes), using default '{}'",
        SettingKey::DisplayUtcOffsetMinutes.as_str(),
        offset,
        SettingKey::DisplayUtcOffsetMinutes.default_value()
    );
    SettingKey::DisplayUtcOffsetMinutes
        .default_value()
        .parse()
        .unwrap_or_default()
}

fn parse_or_default<T: FromStr + Default>(values: &HashMap<SettingKey, String>, key: SettingKey) -> T {
    let value = raw(values, key);
    value.trim().parse::<T>().unwrap_or_else(|_| {
        warn!(
            "Invalid value '{}' for setting '{}', using default '{}'",
            value,
            key.as_str(),
            key.default_value()
        );
        key.default_value().parse::<T>().unwrap_or_default()
    })
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database (or holds NULL).
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &SqlitePool, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &SqlitePool, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}
