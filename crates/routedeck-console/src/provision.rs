//! Lazy provisioning of the remote-display helper binary.
//!
//! The helper is fetched once, on first use, and cached at the configured
//! path. After that it is only ever read.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::HelperConfig;
use crate::error::ProvisionError;

pub struct HelperProvisioner {
    path: PathBuf,
    url: String,
    executable_name: String,
}

impl HelperProvisioner {
    pub fn new(config: &HelperConfig) -> Self {
        Self {
            path: config.path.clone(),
            url: config.url.clone(),
            executable_name: config.executable_name.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_cached(&self) -> bool {
        self.path.is_file()
    }

    /// Return the helper path, downloading it first if it is not cached.
    pub async fn ensure(&self) -> Result<PathBuf, ProvisionError> {
        if self.is_cached() {
            return Ok(self.path.clone());
        }

        tracing::info!(url = %self.url, dest = %self.path.display(), "Fetching remote-display helper");
        self.fetch().await?;
        tracing::info!(dest = %self.path.display(), "Remote-display helper installed");
        Ok(self.path.clone())
    }

    /// Download, unpack, locate and copy into place. The temporary
    /// directory is removed when it goes out of scope, on every path.
    async fn fetch(&self) -> Result<(), ProvisionError> {
        let response = reqwest::get(&self.url).await?;
        if !response.status().is_success() {
            return Err(ProvisionError::HttpStatus(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;

        let temp_dir = tempfile::tempdir()?;
        let download = temp_dir.path().join(download_name(&self.url));
        tokio::fs::write(&download, &bytes).await?;

        let found = if is_archive(&self.url) {
            let extract_dir = temp_dir.path().join("extract");
            tokio::fs::create_dir_all(&extract_dir).await?;
            extract(&download, &extract_dir).await?;
            find_executable(&extract_dir, &self.executable_name).ok_or_else(|| {
                ProvisionError::ExecutableNotFound {
                    name: self.executable_name.clone(),
                }
            })?
        } else {
            download
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&found, &self.path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(())
    }
}

fn download_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .map(|name| name.split(['?', '#']).next().unwrap_or(name))
        .filter(|name| !name.is_empty())
        .unwrap_or("download")
        .to_string()
}

fn is_archive(url: &str) -> bool {
    let name = download_name(url).to_lowercase();
    [".zip", ".tar", ".tar.gz", ".tgz"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// Unpack with the platform `tar`, which also reads zip on Windows.
async fn extract(archive: &Path, dest: &Path) -> Result<(), ProvisionError> {
    let output = Command::new("tar")
        .arg("-xf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .output()
        .await
        .map_err(|e| ProvisionError::Extract(format!("failed to run tar: {e}")))?;

    if !output.status.success() {
        return Err(ProvisionError::Extract(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}

/// Depth-first search for a file named `name`, ignoring ASCII case.
pub fn find_executable(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry
            .file_name()
            .to_str()
            .is_some_and(|f| f.eq_ignore_ascii_case(name))
        {
            return Some(path);
        }
    }
    subdirs.iter().find_map(|d| find_executable(d, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: PathBuf, url: &str) -> HelperConfig {
        HelperConfig {
            path,
            url: url.to_string(),
            executable_name: "CERHost.exe".to_string(),
        }
    }

    #[test]
    fn finds_executable_in_nested_dirs_ignoring_case() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("CERHost").join("bin");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"").unwrap();
        std::fs::write(nested.join("cerhost.EXE"), b"MZ").unwrap();

        let found = find_executable(dir.path(), "CERHost.exe").unwrap();
        assert_eq!(found, nested.join("cerhost.EXE"));
        assert!(find_executable(dir.path(), "other.exe").is_none());
    }

    #[test]
    fn download_names_and_archive_detection() {
        assert_eq!(
            download_name("https://example.com/res/5047075211.zip"),
            "5047075211.zip"
        );
        assert_eq!(download_name("https://example.com/tool.exe?x=1"), "tool.exe");
        assert_eq!(download_name("https://example.com/"), "download");
        assert!(is_archive("https://example.com/a.ZIP"));
        assert!(is_archive("https://example.com/a.tar.gz"));
        assert!(!is_archive("https://example.com/CERHost.exe"));
    }

    #[tokio::test]
    async fn cached_helper_is_reused_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CERHost.exe");
        std::fs::write(&path, b"MZ").unwrap();

        // The URL is unreachable; a cache hit must not touch it.
        let provisioner = HelperProvisioner::new(&config(path.clone(), "http://127.0.0.1:9/x.zip"));
        assert!(provisioner.is_cached());
        assert_eq!(provisioner.ensure().await.unwrap(), path);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_helper() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CERHost.exe");
        let provisioner = HelperProvisioner::new(&config(path.clone(), "http://127.0.0.1:9/x.zip"));

        assert!(provisioner.ensure().await.is_err());
        assert!(!path.exists());
    }
}
