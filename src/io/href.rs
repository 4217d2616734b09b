//! String helpers for catalog hrefs, which are either URLs
//! (`https://host/a/b.json`) or filesystem paths (`/data/a/b.json`,
//! `a/b.json`). Both use `/` as separator.

const ROOT_FILE: &str = "catalog.json";

pub fn is_url(href: &str) -> bool {
    href.contains("://")
}

pub fn is_absolute(href: &str) -> bool {
    is_url(href) || href.starts_with('/')
}

/// Split into the part that `..` may never climb above and the path.
fn split_root(href: &str) -> (&str, &str) {
    if let Some(scheme_end) = href.find("://") {
        let rest = &href[scheme_end + 3..];
        let host_end = rest.find('/').map(|i| scheme_end + 3 + i).unwrap_or(href.len());
        (&href[..host_end], &href[host_end..])
    } else {
        ("", href)
    }
}

/// Parent "directory" of an href, without trailing slash.
pub fn dirname(href: &str) -> String {
    let (root, path) = split_root(href);
    match path.rfind('/') {
        Some(0) => format!("{root}/"),
        Some(idx) => format!("{root}{}", &path[..idx]),
        None if root.is_empty() => ".".to_string(),
        None => root.to_string(),
    }
}

/// Last path segment, without query string or fragment.
pub fn file_name(href: &str) -> &str {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    let (_, path) = split_root(&href[..end]);
    path.rsplit('/').next().unwrap_or(path)
}

/// Resolve `href` against the directory `base_dir`.
pub fn join(base_dir: &str, href: &str) -> String {
    if is_absolute(href) {
        return href.to_string();
    }
    let (root, base_path) = split_root(base_dir);
    let anchored = base_path.starts_with('/') || !root.is_empty();
    let mut segments: Vec<&str> = base_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !anchored {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let path = segments.join("/");
    if anchored {
        format!("{root}/{path}")
    } else if path.is_empty() {
        ".".to_string()
    } else {
        path
    }
}

/// Relative href from directory `from_dir` to `target`; `target` is returned
/// unchanged when the two do not share a root.
pub fn relative(from_dir: &str, target: &str) -> String {
    let (from_root, from_path) = split_root(from_dir);
    let (to_root, to_path) = split_root(target);
    if from_root != to_root || from_path.starts_with('/') != to_path.starts_with('/') {
        return target.to_string();
    }
    let from: Vec<&str> = from_path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let to: Vec<&str> = to_path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    if parts.first() != Some(&"..") {
        parts.insert(0, ".");
    }
    parts.join("/")
}

/// Href of the root catalog file for a catalog URL that may name either the
/// file or its directory.
pub fn catalog_file(url: &str) -> String {
    if url.ends_with(ROOT_FILE) {
        url.to_string()
    } else {
        format!("{}/{ROOT_FILE}", url.trim_end_matches('/'))
    }
}
