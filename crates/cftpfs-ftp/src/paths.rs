//! Remote path helpers. All remote paths are absolute and `/`-separated.

/// Non-empty components of an absolute remote path, in order.
pub(crate) fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Splits `path` into its parent directory and final component.
/// `"/a/b"` becomes `("/a", "b")`; a top-level entry has parent `"/"`.
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("/", path),
    }
}

/// Every proper ancestor directory of `path` below the root, shallowest
/// first: `"/a/b/c.txt"` yields `["/a", "/a/b"]`.
pub(crate) fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut prefix = String::new();
    let comps: Vec<&str> = components(path).collect();
    for comp in comps.iter().take(comps.len().saturating_sub(1)) {
        prefix.push('/');
        prefix.push_str(comp);
        out.push(prefix.clone());
    }
    out
}
