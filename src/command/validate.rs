use crate::command::Error;
use crate::configuration::ManifestConfig;
use crate::manifest::{ManifestValidator, ValidationOptions};
use argh::FromArgs;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "validate",
    description = "Validate a package manifest"
)]
pub struct Options {
    #[argh(positional)]
    /// the manifest file, JSON or YAML
    pub manifest: PathBuf,
    #[argh(option)]
    /// the local schema, overriding the configured one
    pub schema: Option<String>,
    #[argh(option)]
    /// a file or directory to remove if the manifest is rejected (repeatable)
    pub leftover: Vec<PathBuf>,
}

pub struct Command {
    validator: ManifestValidator,
    manifest: PathBuf,
    options: ValidationOptions,
}

impl Command {
    pub fn new(options: &Options, config: &ManifestConfig) -> Result<Self, Error> {
        let mut config = config.clone();
        if let Some(schema) = &options.schema {
            config.schema.clone_from(schema);
        }

        Ok(Self {
            validator: ManifestValidator::new(&config)?,
            manifest: options.manifest.clone(),
            options: ValidationOptions {
                files: options.leftover.clone(),
            },
        })
    }

    pub async fn run(&self) -> Result<(), Error> {
        let manifest = match load_manifest(&self.manifest).await {
            Ok(manifest) => manifest,
            Err(error) => {
                // Rejected before validation.
                drop(crate::manifest::LeftoverFiles::new(self.options.files.clone()));
                return Err(error);
            }
        };

        self.validator.validate(&manifest, &self.options).await?;
        info!("{} is valid", self.manifest.display());
        Ok(())
    }
}

async fn load_manifest(path: &Path) -> Result<Value, Error> {
    let content = tokio::fs::read(path).await?;

    let is_json = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_slice(&content)?)
    } else {
        Ok(serde_yaml::from_slice(&content)?)
    }
}
