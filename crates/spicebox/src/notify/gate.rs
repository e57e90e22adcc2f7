//! Dispatch gating: the user's notification preference and the platform's
//! permission state.
//!
//! Both are read immediately before each dispatch decision, so toggling the
//! preference file takes effect on the next low reading without a restart.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

/// Preference key holding the notification on/off flag.
pub const NOTIFICATIONS_KEY: &str = "spicebox_notifications";

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("Failed to access preference file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse preference file {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Failed to encode preferences: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Persistent string key-value store.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError>;

    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationPreference {
    Enabled,
    Disabled,
}

/// Read the notification preference. Anything other than an explicit
/// `disabled` counts as enabled.
pub fn notification_preference(
    store: &dyn PreferenceStore,
) -> Result<NotificationPreference, PreferenceError> {
    let value = store.get(NOTIFICATIONS_KEY)?;
    Ok(match value.as_deref().map(str::parse::<NotificationPreference>) {
        Some(Ok(NotificationPreference::Disabled)) => NotificationPreference::Disabled,
        _ => NotificationPreference::Enabled,
    })
}

pub fn set_notification_preference(
    store: &dyn PreferenceStore,
    preference: NotificationPreference,
) -> Result<(), PreferenceError> {
    store.set(NOTIFICATIONS_KEY, &preference.to_string())
}

/// Preferences stored as a flat JSON object on disk.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, PreferenceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(PreferenceError::Io(self.path.clone(), e)),
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents).map_err(|e| PreferenceError::Parse(self.path.clone(), e))
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());

        let encoded = serde_json::to_string_pretty(&values).map_err(PreferenceError::Encode)?;
        std::fs::write(&self.path, encoded).map_err(|e| PreferenceError::Io(self.path.clone(), e))
    }
}

/// In-memory preference store for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: std::sync::Mutex<BTreeMap<String, String>>,
}

#[cfg(test)]
impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Platform-level notification permission.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Never asked; treated as not granted.
    Default,
}

pub trait PermissionSource: Send + Sync {
    fn permission(&self) -> PermissionState;
}

/// A fixed permission, as configured.
impl PermissionSource for PermissionState {
    fn permission(&self) -> PermissionState {
        *self
    }
}

/// Why a warranted notification was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDenial {
    DisabledByUser,
    NotPermitted(PermissionState),
}

impl std::fmt::Display for GateDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateDenial::DisabledByUser => write!(f, "notifications disabled by user preference"),
            GateDenial::NotPermitted(state) => {
                write!(f, "notification permission not granted ({})", state)
            }
        }
    }
}

/// Decides, right before a dispatch, whether it may happen.
pub trait DispatchGate: Send + Sync {
    fn check(&self) -> Result<(), GateDenial>;
}

pub struct NotificationGate {
    preferences: Box<dyn PreferenceStore>,
    permission: Box<dyn PermissionSource>,
}

impl NotificationGate {
    pub fn new(preferences: Box<dyn PreferenceStore>, permission: Box<dyn PermissionSource>) -> Self {
        Self {
            preferences,
            permission,
        }
    }
}

impl DispatchGate for NotificationGate {
    fn check(&self) -> Result<(), GateDenial> {
        let preference = notification_preference(self.preferences.as_ref()).unwrap_or_else(|e| {
            warn!("Could not read notification preference, assuming enabled: {}", e);
            NotificationPreference::Enabled
        });
        if preference == NotificationPreference::Disabled {
            return Err(GateDenial::DisabledByUser);
        }

        match self.permission.permission() {
            PermissionState::Granted => Ok(()),
            other => Err(GateDenial::NotPermitted(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn gate(preference: Option<&str>, permission: PermissionState) -> NotificationGate {
        let store = MemoryPreferenceStore::default();
        if let Some(p) = preference {
            store.set(NOTIFICATIONS_KEY, p).unwrap();
        }
        NotificationGate::new(Box::new(store), Box::new(permission))
    }

    #[test]
    fn test_gate_allows_by_default_when_granted() {
        assert_eq!(gate(None, PermissionState::Granted).check(), Ok(()));
        assert_eq!(gate(Some("enabled"), PermissionState::Granted).check(), Ok(()));
    }

    #[test]
    fn test_gate_denies_when_disabled() {
        assert_eq!(
            gate(Some("disabled"), PermissionState::Granted).check(),
            Err(GateDenial::DisabledByUser)
        );
    }

    #[test]
    fn test_gate_denies_without_permission() {
        assert_eq!(
            gate(None, PermissionState::Denied).check(),
            Err(GateDenial::NotPermitted(PermissionState::Denied))
        );
        assert_eq!(
            gate(None, PermissionState::Default).check(),
            Err(GateDenial::NotPermitted(PermissionState::Default))
        );
    }

    #[test]
    fn test_unknown_preference_value_counts_as_enabled() {
        assert_eq!(gate(Some("maybe"), PermissionState::Granted).check(), Ok(()));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path().join("prefs.json"));

        assert_eq!(store.get(NOTIFICATIONS_KEY).unwrap(), None);
        assert_eq!(
            notification_preference(&store).unwrap(),
            NotificationPreference::Enabled
        );

        set_notification_preference(&store, NotificationPreference::Disabled).unwrap();
        assert_eq!(
            store.get(NOTIFICATIONS_KEY).unwrap().as_deref(),
            Some("disabled")
        );

        // A second handle on the same file sees the change.
        let reopened = FilePreferenceStore::new(store.path());
        assert_eq!(
            notification_preference(&reopened).unwrap(),
            NotificationPreference::Disabled
        );
    }

    #[test]
    fn test_file_store_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let store = FilePreferenceStore::new(&path);
        store.set(NOTIFICATIONS_KEY, "enabled").unwrap();

        assert_eq!(store.get("theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn test_file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FilePreferenceStore::new(&path);
        assert!(matches!(
            store.get(NOTIFICATIONS_KEY),
            Err(PreferenceError::Parse(_, _))
        ));
    }

    #[test]
    fn test_permission_state_parsing() {
        assert_eq!(
            PermissionState::from_str("granted").unwrap(),
            PermissionState::Granted
        );
        assert_eq!(PermissionState::Default.to_string(), "default");
    }
}
