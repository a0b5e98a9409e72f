use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use uuid::Uuid;

use super::Language;

/// Scratch directory owned by exactly one execution
///
/// The directory name embeds a timestamp and a random v4 UUID so concurrent
/// executions never collide. Everything the execution writes lives inside
/// it and is removed by [`Workspace::release`], or by `Drop` on any path
/// that skips the explicit release.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    token: String,
    released: bool,
}

impl Workspace {
    /// Creates a fresh, uniquely named directory under `root`
    pub fn allocate(root: &Path, language: &Language) -> std::io::Result<Self> {
        let token = Uuid::new_v4().simple().to_string();
        let dir = root.join(format!(
            "coderun-{}-{}-{}",
            language.name(),
            Local::now().format("%y%m%d-%H%M%S"),
            token
        ));
        fs::create_dir_all(&dir)?;
        log::debug!("Allocated workspace {}", dir.display());

        Ok(Self {
            dir,
            token,
            released: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Random component of the directory name, usable as a file stem
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Path of a caller-named file inside the workspace
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Removes the workspace and everything in it
    ///
    /// Failures are logged and swallowed: cleanup must never replace the
    /// result of the execution it belongs to.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("Released workspace {}", self.dir.display()),
            Err(e) => log::warn!(
                "Failed to clean up workspace {}: {e}",
                self.dir.display()
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
