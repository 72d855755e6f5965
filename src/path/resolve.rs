use crate::path::{CanonicalPath, TenantRoot};
use crate::PathError;

/// Percent-encoded forms of separators, dots and NUL, matched case-insensitively
const ENCODED_SEQUENCES: &[&str] = &["%2f", "%5c", "%2e", "%00"];

/// Resolves a logical path into a canonical coordinate within `root`
///
/// # Resolution Rules
///
/// 1. A leading `/` or `\` makes `relative` absolute within the tenant root;
///    otherwise it is joined under `base`
/// 2. `\` is treated as a separator, empty and `.` segments are dropped
/// 3. `..` pops one segment; popping past the tenant root fails
/// 4. Control characters, percent-encoded separators/dots and drive
///    prefixes (`C:`) are rejected rather than sanitized, wherever the
///    segment appears
///
/// Resolving a canonical path again yields the same path.
///
/// # Example
///
/// ```
/// use folio::path::{resolve, CanonicalPath, TenantRoot};
///
/// let root = TenantRoot::new("acme").unwrap();
/// let base = resolve(&root, &CanonicalPath::root(), "site/css").unwrap();
/// let p = resolve(&root, &base, "../img/./logo.png").unwrap();
/// assert_eq!(p.as_str(), "site/img/logo.png");
/// assert!(resolve(&root, &base, "../../../etc/passwd").is_err());
/// ```
pub fn resolve(
    root: &TenantRoot,
    base: &CanonicalPath,
    relative: &str,
) -> Result<CanonicalPath, PathError> {
    let absolute = relative.starts_with('/') || relative.starts_with('\\');
    let start: Vec<&str> = if absolute {
        Vec::new()
    } else {
        base.segments().collect()
    };

    let segments = normalize(relative, start)?;
    tracing::trace!("Resolved '{}' in tenant {} to /{}", relative, root, segments.join("/"));
    Ok(CanonicalPath::from_segments(&segments))
}

/// Resolves `relative` beneath `base`, refusing anything that leaves `base`
///
/// Unlike [`resolve`], absolute paths are rejected and `..` may not climb
/// above `base` even if the result would still be inside the tenant root.
/// Used for untrusted inputs such as archive entry names.
pub fn resolve_contained(
    root: &TenantRoot,
    base: &CanonicalPath,
    relative: &str,
) -> Result<CanonicalPath, PathError> {
    if relative.starts_with('/') || relative.starts_with('\\') {
        return Err(PathError::Escapes(relative.to_string()));
    }

    let tail = normalize(relative, Vec::new())?;
    let mut segments: Vec<&str> = base.segments().collect();
    segments.extend(tail);

    tracing::trace!("Contained '{}' under {} in tenant {}", relative, base, root);
    Ok(CanonicalPath::from_segments(&segments))
}

/// Validates a single path segment used as a resource name
pub fn validate_name(name: &str) -> Result<(), PathError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || check_segment(name).is_err();

    if invalid {
        return Err(PathError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Normalizes `input` on top of `start`, failing if `..` underflows `start`'s floor
fn normalize<'a>(input: &'a str, mut segments: Vec<&'a str>) -> Result<Vec<&'a str>, PathError> {
    for segment in input.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Escapes(input.to_string()));
                }
            }
            _ => {
                check_segment(segment).map_err(|reason| PathError::Malformed(input.to_string(), reason))?;
                segments.push(segment);
            }
        }
    }
    Ok(segments)
}

fn check_segment(segment: &str) -> Result<(), &'static str> {
    if segment.chars().any(|c| c.is_control()) {
        return Err("control character");
    }

    let lower = segment.to_ascii_lowercase();
    if ENCODED_SEQUENCES.iter().any(|seq| lower.contains(seq)) {
        return Err("encoded separator");
    }

    if is_drive_prefix(segment) {
        return Err("drive prefix");
    }

    Ok(())
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
