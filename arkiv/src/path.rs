//! Slash-delimited path utilities.
//!
//! The Arkiv API has no native path addressing; folders are fetched by their
//! full path and files are located by scanning folder snapshots. These helpers
//! keep the parent/leaf arithmetic in one place.

/// Split a path into its parent path and leaf name.
///
/// Leading and trailing slashes are ignored. The parent always starts with
/// `/`; the root itself has an empty leaf.
///
/// ```
/// use arkiv::path::split;
///
/// assert_eq!(split("/some/full/path"), ("/some/full".into(), "path"));
/// assert_eq!(split("/some/full/path/"), ("/some/full".into(), "path"));
/// assert_eq!(split("/something"), ("/".into(), "something"));
/// assert_eq!(split("/"), ("/".into(), ""));
/// ```
#[must_use]
pub fn split(path: &str) -> (String, &str) {
    let trimmed = path.trim_matches('/');

    match trimmed.rsplit_once('/') {
        Some((parent, leaf)) => (format!("/{parent}"), leaf),
        None => ("/".to_owned(), trimmed),
    }
}

/// Join a parent path and a child name with a single separator.
///
/// ```
/// use arkiv::path::join;
///
/// assert_eq!(join("/", "documents"), "/documents");
/// assert_eq!(join("/documents/", "reports"), "/documents/reports");
/// assert_eq!(join("/documents", "reports"), "/documents/reports");
/// ```
#[must_use]
pub fn join(parent: &str, name: &str) -> String {
    format!(
        "{}/{}",
        parent.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}
