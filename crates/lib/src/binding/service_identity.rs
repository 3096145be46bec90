//! Service identity: the credential that authorizes an adapter instance to
//! operate, independent of any end-user auth on the channel.

use crate::error::BindingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Permissions every binding requires.
pub const BASELINE_PERMISSIONS: [&str; 4] = [
    "channel:read",
    "channel:write",
    "gateway:send",
    "gateway:receive",
];

/// Stored service credential (e.g. `~/.ponte/identity.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIdentity {
    pub id: String,
    pub issued_at: DateTime<Utc>,
    /// None = does not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl ServiceIdentity {
    /// Check expiry and the four baseline permissions.
    pub fn verify(&self) -> Result<(), BindingError> {
        if matches!(self.expires_at, Some(t) if t <= Utc::now()) {
            return Err(BindingError::AuthExpired);
        }
        for perm in BASELINE_PERMISSIONS {
            if !self.permissions.iter().any(|p| p == perm) {
                return Err(BindingError::AuthMissingPermission(perm.to_string()));
            }
        }
        Ok(())
    }

    /// Load from a JSON file. Returns None when missing or invalid.
    pub fn load(path: &Path) -> Option<Self> {
        let s = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&s).ok()
    }

    /// Save to a JSON file, creating parent dirs as needed.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Fresh identity carrying the baseline permissions, valid for `ttl_days`
    /// (None = no expiry).
    pub fn issue(ttl_days: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("svc-{}", uuid::Uuid::new_v4()),
            issued_at: now,
            expires_at: ttl_days.map(|d| now + chrono::Duration::days(d)),
            permissions: BASELINE_PERMISSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_identity_verifies() {
        assert!(ServiceIdentity::issue(Some(30)).verify().is_ok());
        assert!(ServiceIdentity::issue(None).verify().is_ok());
    }

    #[test]
    fn expired_identity_fails() {
        let mut id = ServiceIdentity::issue(None);
        id.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(matches!(id.verify(), Err(BindingError::AuthExpired)));
    }

    #[test]
    fn missing_permission_fails() {
        let mut id = ServiceIdentity::issue(None);
        id.permissions.retain(|p| p != "gateway:send");
        match id.verify() {
            Err(BindingError::AuthMissingPermission(p)) => assert_eq!(p, "gateway:send"),
            other => panic!("expected missing permission, got {:?}", other),
        }
    }
}
