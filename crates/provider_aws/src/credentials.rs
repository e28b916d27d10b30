use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

pub const FALLBACK_REGION: &str = "us-east-1";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Environment variables first, then the shared credentials file.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    pub fn resolve_with(
        lookup: impl Fn(&str) -> Option<String>,
        home: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(credentials) = Self::from_lookup(&lookup) {
            debug!(source = "environment", "resolved aws credentials");
            return Ok(credentials);
        }

        let profile = lookup("AWS_PROFILE")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "default".to_string());
        let path = match lookup("AWS_SHARED_CREDENTIALS_FILE").filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => match home {
                Some(home) => home.join(".aws").join("credentials"),
                None => bail!(
                    "AWS credentials not found: set AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY or configure ~/.aws/credentials"
                ),
            },
        };
        let credentials = Self::from_profile_file(&path, &profile)?;
        debug!(source = "profile", profile = %profile, "resolved aws credentials");
        Ok(credentials)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let access_key_id = lookup("AWS_ACCESS_KEY_ID").filter(|v| !v.is_empty())?;
        let secret_access_key = lookup("AWS_SECRET_ACCESS_KEY").filter(|v| !v.is_empty())?;
        let session_token = lookup("AWS_SESSION_TOKEN").filter(|v| !v.is_empty());
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }

    pub fn from_profile_file(path: &Path, profile: &str) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials file {}", path.display()))?;
        parse_profile(&text, profile).with_context(|| {
            format!(
                "profile `{profile}` in {} has no aws_access_key_id/aws_secret_access_key",
                path.display()
            )
        })
    }
}

fn parse_profile(text: &str, profile: &str) -> Option<Credentials> {
    let mut in_profile = false;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let section = section.trim();
            in_profile = section == profile || section == format!("profile {profile}");
            continue;
        }
        if !in_profile {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "aws_access_key_id" => access_key_id = Some(value),
            "aws_secret_access_key" => secret_access_key = Some(value),
            "aws_session_token" => session_token = Some(value),
            _ => {}
        }
    }

    Some(Credentials {
        access_key_id: access_key_id?,
        secret_access_key: secret_access_key?,
        session_token,
    })
}

/// Explicit region, then `AWS_REGION`, then `AWS_DEFAULT_REGION`.
pub fn resolve_region(explicit: Option<&str>) -> String {
    resolve_region_with(explicit, |key| std::env::var(key).ok())
}

pub fn resolve_region_with(explicit: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> String {
    explicit
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| lookup("AWS_REGION").filter(|r| !r.trim().is_empty()))
        .or_else(|| lookup("AWS_DEFAULT_REGION").filter(|r| !r.trim().is_empty()))
        .unwrap_or_else(|| FALLBACK_REGION.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn prefers_environment_credentials() {
        let env = HashMap::from([
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]);
        let creds = Credentials::resolve_with(|k| env.get(k).map(|v| v.to_string()), None)
            .expect("env credentials");
        assert_eq!(creds.access_key_id, "AKID");
        assert_eq!(creds.session_token, None);
    }

    #[test]
    fn reads_named_profile_from_credentials_file() {
        let dir = tempdir().expect("tempdir");
        let aws_dir = dir.path().join(".aws");
        fs::create_dir_all(&aws_dir).expect("create .aws");
        fs::write(
            aws_dir.join("credentials"),
            "[default]\naws_access_key_id = DEF\naws_secret_access_key = defsecret\n\n\
             [study]\naws_access_key_id = STUDY\naws_secret_access_key = studysecret\naws_session_token = tok\n",
        )
        .expect("write credentials");

        let env = HashMap::from([("AWS_PROFILE", "study")]);
        let creds = Credentials::resolve_with(
            |k| env.get(k).map(|v| v.to_string()),
            Some(dir.path().to_path_buf()),
        )
        .expect("profile credentials");
        assert_eq!(creds.access_key_id, "STUDY");
        assert_eq!(creds.session_token.as_deref(), Some("tok"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "very-secret".to_string(),
            session_token: Some("token".to_string()),
        };
        let text = format!("{creds:?}");
        assert!(!text.contains("very-secret"));
        assert!(!text.contains("\"token\""));
    }

    #[test]
    fn region_falls_back_through_environment() {
        let env = HashMap::from([("AWS_DEFAULT_REGION", "ap-northeast-2")]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());
        assert_eq!(resolve_region_with(Some(" eu-west-1 "), lookup), "eu-west-1");
        assert_eq!(resolve_region_with(Some(""), lookup), "ap-northeast-2");
        assert_eq!(resolve_region_with(None, |_| None), FALLBACK_REGION);
    }
}
