//! Path syntax: segments separated by `.` or `/`, rendered canonically with `.`.

use traj_core::{ErrorInfo, TrajError};

pub const SEPARATOR: char = '.';

fn is_separator(ch: char) -> bool {
    ch == '.' || ch == '/'
}

/// Checks a single node name.
pub fn validate_name(name: &str) -> Result<(), TrajError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$');
    if valid {
        Ok(())
    } else {
        Err(TrajError::NameCollision(
            ErrorInfo::new("name-invalid", "names use only [A-Za-z0-9_$]")
                .with_context("name", name),
        ))
    }
}

/// Splits a path into validated segments.
pub fn split(path: &str) -> Result<Vec<&str>, TrajError> {
    let segments: Vec<&str> = path.split(is_separator).collect();
    if path.is_empty() || segments.iter().any(|segment| segment.is_empty()) {
        return Err(TrajError::NotFound(
            ErrorInfo::new("path-invalid", "path has an empty segment").with_context("path", path),
        ));
    }
    for segment in &segments {
        validate_name(segment)?;
    }
    Ok(segments)
}

pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (idx, segment) in segments.iter().enumerate() {
        if idx > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(segment.as_ref());
    }
    out
}

/// Rewrites `a/b.c` as `a.b.c`.
pub fn canonical(path: &str) -> Result<String, TrajError> {
    Ok(join(&split(path)?))
}
