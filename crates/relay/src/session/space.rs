// Per-user working directory handed out at sign-in.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Handle on `<root>/<user_id>`. The directory is created when the space
/// is opened and left on disk when the handle is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpace {
    user_id: String,
    dir: PathBuf,
}

impl UserSpace {
    pub async fn open(root: &Path, user_id: &str) -> anyhow::Result<Self> {
        validate_user_segment(user_id)?;
        let dir = root.join(user_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to allocate user space at {}", dir.display()))?;
        Ok(Self { user_id: user_id.to_owned(), dir })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn validate_user_segment(user_id: &str) -> anyhow::Result<()> {
    let trimmed = user_id.trim();
    if trimmed.is_empty()
        || trimmed != user_id
        || user_id == "."
        || user_id == ".."
        || user_id.contains(['/', '\\', '\0'])
    {
        anyhow::bail!("user id '{user_id}' cannot name a user space directory");
    }
    Ok(())
}
