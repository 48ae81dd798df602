//! Build-policy file handling
//!
//! Repositories may ship a `thinx.yml` naming the platform they target
//! (with an explicit `arch`) and a `devsec` security section. The file
//! is rewritten with decrypted network credentials before the build and
//! is therefore on the mandatory-cleanup list.

use std::path::Path;

use fwforge_errors::Error;
use serde_yml::{Mapping, Value};

/// Build-policy file name inside the project directory.
pub const POLICY_FILE: &str = "thinx.yml";

/// Parsed build policy, kept as a document so unknown sections survive
/// the rewrite.
#[derive(Debug, Clone)]
pub struct BuildPolicy {
    doc: Mapping,
}

impl BuildPolicy {
    /// Load the policy from a project directory. `Ok(None)` when the
    /// file is absent; a file that fails to parse is treated the same
    /// way (it cannot name an architecture) and logged.
    pub fn load(project_dir: &Path) -> Result<Option<Self>, Error> {
        let path = project_dir.join(POLICY_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&path).map_err(|e| Error::io_with_path(&e, &path))?;
        match serde_yml::from_str::<Value>(&content) {
            Ok(Value::Mapping(doc)) => Ok(Some(Self { doc })),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "build policy is not a mapping, ignoring");
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "build policy failed to parse, ignoring");
                Ok(None)
            }
        }
    }

    /// The platform the policy targets: the first key that is not the
    /// security section.
    #[must_use]
    pub fn platform_key(&self) -> Option<String> {
        self.doc
            .iter()
            .filter_map(|(k, _)| k.as_str())
            .find(|k| *k != "devsec")
            .map(ToString::to_string)
    }

    /// Architecture declared for the targeted platform, if any.
    #[must_use]
    pub fn arch(&self) -> Option<String> {
        let platform = self.platform_key()?;
        let section = self
            .doc
            .iter()
            .find(|(k, _)| k.as_str() == Some(platform.as_str()))
            .map(|(_, v)| v)?;
        let Value::Mapping(section) = section else {
            return None;
        };
        section
            .iter()
            .find(|(k, _)| k.as_str() == Some("arch"))
            .and_then(|(_, v)| v.as_str())
            .map(ToString::to_string)
    }

    /// Write decrypted credentials into the `devsec` section. A missing
    /// section is created with the transmit key as its cipher key, the
    /// shared-key fallback for fleets without per-device DevSec.
    pub fn inject_credentials(
        &mut self,
        transmit_key: &str,
        ssid: Option<&str>,
        pass: Option<&str>,
    ) {
        let has_devsec = self
            .doc
            .iter()
            .any(|(k, _)| k.as_str() == Some("devsec"));
        if !has_devsec {
            tracing::debug!("devsec not defined, seeding with transmit key");
            let mut devsec = Mapping::new();
            devsec.insert(Value::from("ckey"), Value::from(transmit_key));
            self.doc
                .insert(Value::from("devsec"), Value::Mapping(devsec));
        }
        let Some(Value::Mapping(devsec)) = self
            .doc
            .iter_mut()
            .find(|(k, _)| k.as_str() == Some("devsec"))
            .map(|(_, v)| v)
        else {
            return;
        };
        if let Some(ssid) = ssid {
            devsec.insert(Value::from("ssid"), Value::from(ssid));
        }
        if let Some(pass) = pass {
            devsec.insert(Value::from("pass"), Value::from(pass));
        }
    }

    /// Serialize the policy back into the project directory.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, project_dir: &Path) -> Result<(), Error> {
        let path = project_dir.join(POLICY_FILE);
        let content = serde_yml::to_string(&Value::Mapping(self.doc.clone()))
            .map_err(|e| Error::internal(format!("policy serialization failed: {e}")))?;
        std::fs::write(&path, content).map_err(|e| Error::io_with_path(&e, &path))?;
        Ok(())
    }
}
