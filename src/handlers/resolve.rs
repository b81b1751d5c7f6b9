//! Path resolution against a configured server root. This is the
//! idiomatic substitute for the `chroot`/`chdir` sandboxing named in the
//! program this was distilled from: request paths are joined onto the
//! root component-by-component and any `..`, absolute, or drive-prefix
//! component is rejected before a filesystem call is ever made.

use std::path::{Component, Path, PathBuf};

use crate::error::HandlerError;

pub fn resolve(root: &Path, request_path: &str) -> Result<PathBuf, HandlerError> {
    let mut resolved = root.to_path_buf();

    for component in Path::new(request_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(HandlerError::Forbidden);
            }
        }
    }

    Ok(resolved)
}
