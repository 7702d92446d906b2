use std::fs;
use std::path::PathBuf;

use zeroize::Zeroizing;

/// Stores the admin session token between CLI invocations.
pub struct SessionStore {
    token_path: PathBuf,
}

impl SessionStore {
    pub fn new() -> anyhow::Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not find config directory"))?
            .join("spike");
        Ok(Self::at(config_dir.join("session")))
    }

    pub fn at(token_path: PathBuf) -> Self {
        Self { token_path }
    }

    /// Load the saved token, if any.
    pub fn load(&self) -> anyhow::Result<Option<Zeroizing<String>>> {
        if !self.token_path.exists() {
            return Ok(None);
        }
        let token = Zeroizing::new(fs::read_to_string(&self.token_path)?);
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(Zeroizing::new(trimmed.to_string())))
    }

    /// Save a token, readable only by the current user.
    pub fn save(&self, token: &str) -> anyhow::Result<()> {
        if let Some(dir) = self.token_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.token_path, token)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.token_path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.token_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
