use crate::adapter::Error;
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use tracing::{debug, error, info};

pub const REALM_PUBLIC_KEY: &str = "realm_public_key";

/// YAML settings file shared with the Keycloak deployment.
#[derive(Clone, Debug)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<Mapping, Error> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            error!("Error loading config file: {err}");
            Error::Internal(format!("Error loading config file: {err}"))
        })?;

        match serde_yaml::from_str::<Value>(&content)? {
            Value::Mapping(mapping) => Ok(mapping),
            Value::Null => Ok(Mapping::new()),
            _ => Err(Error::Internal(
                "Error loading config file: expected a mapping".to_string(),
            )),
        }
    }

    /// The settings as JSON, for the configuration endpoint.
    pub async fn load_json(&self) -> Result<serde_json::Value, Error> {
        let mapping = self.load().await?;
        Ok(serde_json::to_value(mapping)?)
    }

    pub async fn realm_public_key(&self) -> Result<Option<String>, Error> {
        let mapping = self.load().await?;
        Ok(mapping
            .get(REALM_PUBLIC_KEY)
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
            .map(ToString::to_string))
    }

    pub async fn store_realm_public_key(&self, public_key: &str) -> Result<(), Error> {
        let mut mapping = match self.load().await {
            Ok(mapping) => mapping,
            Err(error) => {
                debug!("Starting from empty settings: {error}");
                Mapping::new()
            }
        };

        mapping.insert(
            Value::String(REALM_PUBLIC_KEY.to_string()),
            Value::String(public_key.to_string()),
        );

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_yaml::to_string(&mapping)?).await?;

        info!("Realm public key stored in {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keycloak.yml");
        tokio::fs::write(&path, "realm: sonata\nport: 8080\n")
            .await
            .unwrap();

        let settings = SettingsFile::new(&path);
        let json = settings.load_json().await.unwrap();
        assert_eq!(json, serde_json::json!({"realm": "sonata", "port": 8080}));
        assert_eq!(settings.realm_public_key().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_realm_public_key_keeps_other_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keycloak.yml");
        tokio::fs::write(&path, "realm: sonata\n").await.unwrap();

        let settings = SettingsFile::new(&path);
        settings.store_realm_public_key("MIIBIjANBgkq").await.unwrap();

        assert_eq!(
            settings.realm_public_key().await.unwrap(),
            Some("MIIBIjANBgkq".to_string())
        );
        let json = settings.load_json().await.unwrap();
        assert_eq!(json["realm"], "sonata");
    }

    #[tokio::test]
    async fn test_missing_file_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let settings = SettingsFile::new(dir.path().join("missing.yml"));
        assert!(matches!(settings.load().await, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_store_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let settings = SettingsFile::new(dir.path().join("config").join("keycloak.yml"));
        settings.store_realm_public_key("KEY").await.unwrap();
        assert_eq!(
            settings.realm_public_key().await.unwrap(),
            Some("KEY".to_string())
        );
    }
}
