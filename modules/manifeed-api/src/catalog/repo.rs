use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::process::Command;

use crate::error::ApiError;

/// What the repository sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryAction {
    Cloned,
    UpToDate,
    Pulled,
}

#[derive(Debug, Clone)]
pub struct RepositorySync {
    pub action: RepositoryAction,
    /// Catalog files to re-apply, relative to the repository root.
    pub changed_files: Vec<String>,
}

/// The git repository holding the feed catalog.
pub struct CatalogRepository {
    url: String,
    branch: String,
    path: PathBuf,
}

impl CatalogRepository {
    pub fn new(url: String, branch: String, path: PathBuf) -> Self {
        Self { url, branch, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pull or clone the catalog repository and report the catalog files
    /// that changed. `force` re-applies every catalog file regardless of
    /// the revision delta.
    pub async fn sync(&self, force: bool) -> Result<RepositorySync, ApiError> {
        if self.url.trim().is_empty() {
            return Err(ApiError::RepositorySync(
                "RSS_FEEDS_REPOSITORY_URL is not configured".to_string(),
            ));
        }

        if !self.path.exists() || is_empty_directory(&self.path) {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| ApiError::RepositorySync(format!("mkdir failed: {err}")))?;
            }
            run_git(
                &[
                    "clone",
                    "--branch",
                    &self.branch,
                    &self.url,
                    &self.path.to_string_lossy(),
                ],
                None,
            )
            .await?;
            return Ok(RepositorySync {
                action: RepositoryAction::Cloned,
                changed_files: list_catalog_files(&self.path)?,
            });
        }

        if !self.path.join(".git").exists() {
            return Err(ApiError::RepositorySync(format!(
                "Path exists but is not a git repository: {}",
                self.path.display()
            )));
        }

        self.validate_remote().await?;
        run_git(&["fetch", "origin", &self.branch], Some(&self.path)).await?;

        let local_revision = run_git(&["rev-parse", "HEAD"], Some(&self.path)).await?;
        let remote_revision = run_git(
            &["rev-parse", &format!("origin/{}", self.branch)],
            Some(&self.path),
        )
        .await?;

        if local_revision == remote_revision {
            let changed_files = if force {
                list_catalog_files(&self.path)?
            } else {
                Vec::new()
            };
            return Ok(RepositorySync {
                action: RepositoryAction::UpToDate,
                changed_files,
            });
        }

        let diffed = self
            .list_changed_catalog_files(&local_revision, &remote_revision)
            .await?;
        run_git(&["checkout", &self.branch], Some(&self.path)).await?;
        run_git(&["pull", "--ff-only", "origin", &self.branch], Some(&self.path)).await?;

        let changed_files = if force {
            list_catalog_files(&self.path)?
        } else {
            diffed
        };
        Ok(RepositorySync {
            action: RepositoryAction::Pulled,
            changed_files,
        })
    }

    async fn validate_remote(&self) -> Result<(), ApiError> {
        let current_remote =
            run_git(&["config", "--get", "remote.origin.url"], Some(&self.path)).await?;
        if normalize_repository_url(&current_remote) != normalize_repository_url(&self.url) {
            return Err(ApiError::RepositorySync(format!(
                "Repository remote mismatch for {}. Expected {}, got {current_remote}.",
                self.path.display(),
                self.url
            )));
        }
        if current_remote != self.url {
            run_git(
                &["remote", "set-url", "origin", &self.url],
                Some(&self.path),
            )
            .await?;
        }
        Ok(())
    }

    async fn list_changed_catalog_files(
        &self,
        old_revision: &str,
        new_revision: &str,
    ) -> Result<Vec<String>, ApiError> {
        let output = run_git(
            &["diff", "--name-only", old_revision, new_revision],
            Some(&self.path),
        )
        .await?;
        let mut changed: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|line| line.ends_with(".json"))
            .map(str::to_string)
            .collect();
        changed.sort();
        changed.dedup();
        Ok(changed)
    }
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<String, ApiError> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let output = command
        .output()
        .await
        .map_err(|err| ApiError::RepositorySync(format!("Failed to run git: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let detail = if stderr.is_empty() { "no stderr output" } else { stderr };
        return Err(ApiError::RepositorySync(format!(
            "Git command failed (git {}): {detail}",
            args.join(" ")
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// All catalog JSON files in the repository, relative paths sorted.
pub fn list_catalog_files(repository_path: &Path) -> Result<Vec<String>, ApiError> {
    let mut files = Vec::new();
    collect_json_files(repository_path, repository_path, &mut files)
        .map_err(|err| ApiError::RepositorySync(format!("Catalog listing failed: {err}")))?;
    files.sort();
    Ok(files)
}

fn collect_json_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<String>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        if path.is_dir() {
            collect_json_files(root, &path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}

fn is_empty_directory(path: &Path) -> bool {
    path.is_dir()
        && std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
}

/// Compare remotes loosely: scp-style and https forms of the same repository
/// are equivalent, case-insensitively and without the `.git` suffix.
fn normalize_repository_url(repository_url: &str) -> String {
    let trimmed = repository_url.trim();

    if let Some(host_and_path) = trimmed.strip_prefix("git@") {
        if let Some((host, path)) = host_and_path.split_once(':') {
            return format!("{}/{}", host.to_ascii_lowercase(), normalize_repository_path(path));
        }
        return normalize_repository_path(host_and_path);
    }

    if let Some((_, rest)) = trimmed.split_once("://") {
        if let Some((host, path)) = rest.split_once('/') {
            return format!("{}/{}", host.to_ascii_lowercase(), normalize_repository_path(path));
        }
        return rest.to_ascii_lowercase();
    }

    normalize_repository_path(trimmed)
}

fn normalize_repository_path(path: &str) -> String {
    let cleaned = path.trim().trim_start_matches('/').trim_end_matches('/');
    cleaned.strip_suffix(".git").unwrap_or(cleaned).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scp_and_https_remotes_are_equivalent() {
        assert_eq!(
            normalize_repository_url("git@github.com:acme/rss-feeds.git"),
            normalize_repository_url("https://GitHub.com/acme/rss-feeds")
        );
    }

    #[test]
    fn trailing_git_and_slashes_are_ignored() {
        assert_eq!(
            normalize_repository_url("https://example.com/team/feeds.git"),
            "example.com/team/feeds"
        );
        assert_eq!(
            normalize_repository_url("https://example.com/team/feeds/"),
            "example.com/team/feeds"
        );
    }

    #[test]
    fn different_repositories_do_not_match() {
        assert_ne!(
            normalize_repository_url("git@github.com:acme/rss-feeds.git"),
            normalize_repository_url("git@github.com:acme/other.git")
        );
    }

    #[test]
    fn lists_catalog_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/.git")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("acme_news.json"), "[]").unwrap();
        std::fs::write(dir.path().join("sub/other_press.json"), "[]").unwrap();
        std::fs::write(dir.path().join("sub/readme.md"), "x").unwrap();
        std::fs::write(dir.path().join(".git/config.json"), "{}").unwrap();

        let files = list_catalog_files(dir.path()).unwrap();
        assert_eq!(files, vec!["acme_news.json", "sub/other_press.json"]);
    }
}
