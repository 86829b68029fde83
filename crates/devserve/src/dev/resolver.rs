//! URL path → output file resolution over ordered mount points.

use crate::config::MountConfig;
use devserve_store::OutputStore;
use std::path::{Component, Path, PathBuf};

/// A URL prefix served from a directory inside the output store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    /// URL prefix, e.g. `/` or `/static/`
    pub public_path: String,
    /// Directory inside the output store
    pub output_dir: PathBuf,
}

impl From<&MountConfig> for MountPoint {
    fn from(mount: &MountConfig) -> Self {
        Self {
            public_path: mount.public_path.clone(),
            output_dir: mount.output_dir.clone(),
        }
    }
}

/// Maps request URLs to files in the output store.
///
/// Mounts are tried in order and the first one that resolves wins, even when
/// a later mount holds a file at the same relative path.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    mounts: Vec<MountPoint>,
    index: Option<String>,
}

impl AssetResolver {
    /// Create a resolver. `index` is the file served for directory requests,
    /// `None` to disable directory index serving.
    pub fn new(mounts: Vec<MountPoint>, index: Option<String>) -> Self {
        Self { mounts, index }
    }

    pub fn mounts(&self) -> &[MountPoint] {
        &self.mounts
    }

    /// Resolve `url` to a regular file in `store`.
    ///
    /// Query string and fragment are ignored and the path is percent-decoded.
    /// Paths that would climb out of a mount's output directory never match
    /// that mount.
    pub async fn resolve(&self, store: &dyn OutputStore, url: &str) -> Option<PathBuf> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let path = urlencoding::decode(path).ok()?;

        for mount in &self.mounts {
            let Some(rest) = path.strip_prefix(mount.public_path.as_str()) else {
                continue;
            };
            let Some(candidate) = join_within(&mount.output_dir, rest) else {
                continue;
            };

            let Ok(metadata) = store.metadata(&candidate).await else {
                continue;
            };

            if metadata.is_file {
                return Some(candidate);
            }

            if metadata.is_dir {
                if let Some(index) = &self.index {
                    let index_path = candidate.join(index);
                    if matches!(store.metadata(&index_path).await, Ok(m) if m.is_file) {
                        return Some(index_path);
                    }
                }
            }
        }

        None
    }
}

/// Join a URL remainder onto `base`, refusing to leave `base`.
fn join_within(base: &Path, rest: &str) -> Option<PathBuf> {
    if rest.contains('\0') {
        return None;
    }

    let mut joined = base.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(rest).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                joined.pop();
                depth -= 1;
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    Some(joined)
}
