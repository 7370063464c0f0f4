use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_SUBDIR: &str = "server_databases";
const MAX_FILENAME_LEN: usize = 250;
const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("filename is empty after cleaning")]
    EmptyFilename,
    #[error("filename \"{0}\" is not allowed")]
    ReservedName(String),
    #[error("filename contains a forbidden character")]
    ForbiddenCharacter,
    #[error("filename exceeds {MAX_FILENAME_LEN} characters")]
    TooLong,
    #[error("resolved path escapes the sandbox")]
    Escape,
    #[error("cannot prepare sandbox directory {path}: {source}")]
    CannotPrepare {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot resolve data root {path}: {source}")]
    CannotResolveRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn clean_filename(raw: &str) -> Result<String, SandboxError> {
    if raw.contains(['/', '\\']) {
        return Err(SandboxError::Escape);
    }

    let without_control: String = raw.chars().filter(|c| !c.is_control()).collect();
    let cleaned = without_control.trim_start_matches('.');

    if cleaned.is_empty() {
        return Err(SandboxError::EmptyFilename);
    }
    if cleaned == "." || cleaned == ".." {
        return Err(SandboxError::ReservedName(cleaned.to_string()));
    }
    if cleaned.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
        return Err(SandboxError::ForbiddenCharacter);
    }
    if cleaned.len() > MAX_FILENAME_LEN {
        return Err(SandboxError::TooLong);
    }

    Ok(cleaned.to_string())
}

/// Resolves a client-supplied filename to an absolute path confined to
/// `<data_root>/server_databases/`, creating that sub-directory if needed.
/// `data_root` empty means "use the process's working directory". A
/// filename carrying a directory separator is rejected outright as a
/// sandbox violation rather than silently reduced to its last component.
pub async fn resolve(
    data_root: &str,
    subdir: Option<&str>,
    client_filename: &str,
) -> Result<PathBuf, SandboxError> {
    let subdir = subdir.unwrap_or(DEFAULT_SUBDIR);

    let root: PathBuf = if data_root.is_empty() {
        std::env::current_dir().map_err(|source| SandboxError::CannotResolveRoot {
            path: ".".to_string(),
            source,
        })?
    } else {
        PathBuf::from(data_root)
    };
    let root = tokio::fs::canonicalize(&root)
        .await
        .map_err(|source| SandboxError::CannotResolveRoot {
            path: root.display().to_string(),
            source,
        })?;

    let sandbox_dir = root.join(subdir);
    match tokio::fs::metadata(&sandbox_dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(SandboxError::CannotPrepare {
                path: sandbox_dir.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "exists and is not a directory",
                ),
            })
        }
        Err(_) => {
            tokio::fs::create_dir_all(&sandbox_dir)
                .await
                .map_err(|source| SandboxError::CannotPrepare {
                    path: sandbox_dir.display().to_string(),
                    source,
                })?;
        }
    }
    let sandbox_dir =
        tokio::fs::canonicalize(&sandbox_dir)
            .await
            .map_err(|source| SandboxError::CannotPrepare {
                path: sandbox_dir.display().to_string(),
                source,
            })?;

    let cleaned = clean_filename(client_filename)?;
    let candidate = sandbox_dir.join(&cleaned);

    let canonical = match tokio::fs::canonicalize(&candidate).await {
        Ok(path) => path,
        Err(_) => candidate,
    };

    if !canonical.starts_with(&sandbox_dir) {
        return Err(SandboxError::Escape);
    }

    Ok(canonical)
}

#[must_use]
pub fn default_subdir() -> &'static str {
    DEFAULT_SUBDIR
}
