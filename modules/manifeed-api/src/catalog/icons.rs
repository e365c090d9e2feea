use std::path::{Component, Path, PathBuf};

use crate::error::ApiError;

/// Resolve an icon reference to a file inside the catalog repository.
///
/// Only relative `.svg` paths under the repository's `img/` directory are
/// served; traversal components and absolute paths are rejected before any
/// filesystem access.
pub fn resolve_icon_path(repository_path: &Path, icon_url: &str) -> Result<PathBuf, ApiError> {
    let trimmed = icon_url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::NotFound("Icon path is empty.".to_string()));
    }

    let relative = Path::new(trimmed.trim_start_matches('/'));
    if relative.is_absolute()
        || relative
            .components()
            .any(|part| !matches!(part, Component::Normal(_)))
    {
        return Err(ApiError::NotFound("Icon path is invalid.".to_string()));
    }

    let relative = if relative.starts_with("img") {
        relative.to_path_buf()
    } else {
        Path::new("img").join(relative)
    };

    if !relative
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"))
    {
        return Err(ApiError::NotFound("Only svg icons are supported.".to_string()));
    }

    let repository_root = repository_path
        .canonicalize()
        .map_err(|_| ApiError::NotFound(format!("Icon not found: {icon_url}")))?;
    let resolved = repository_root
        .join(&relative)
        .canonicalize()
        .map_err(|_| ApiError::NotFound(format!("Icon not found: {icon_url}")))?;

    if !resolved.starts_with(&repository_root) || !resolved.is_file() {
        return Err(ApiError::NotFound(format!("Icon not found: {icon_url}")));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_with_icon() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/acme.svg"), "<svg/>").unwrap();
        std::fs::write(dir.path().join("img/logo.png"), "png").unwrap();
        dir
    }

    #[test]
    fn resolves_icons_with_and_without_img_prefix() {
        let repo = repo_with_icon();
        let direct = resolve_icon_path(repo.path(), "img/acme.svg").unwrap();
        let prefixed = resolve_icon_path(repo.path(), "acme.svg").unwrap();
        assert_eq!(direct, prefixed);
        assert!(direct.ends_with("img/acme.svg"));
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        let repo = repo_with_icon();
        assert!(resolve_icon_path(repo.path(), "../img/acme.svg").is_err());
        assert!(resolve_icon_path(repo.path(), "img/../../etc/passwd.svg").is_err());
        assert!(resolve_icon_path(repo.path(), "/etc/passwd.svg").is_err());
    }

    #[test]
    fn rejects_non_svg_files() {
        let repo = repo_with_icon();
        assert!(resolve_icon_path(repo.path(), "logo.png").is_err());
    }

    #[test]
    fn missing_icons_are_not_found() {
        let repo = repo_with_icon();
        assert!(resolve_icon_path(repo.path(), "missing.svg").is_err());
    }
}
