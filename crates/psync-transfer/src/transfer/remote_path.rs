//! POSIX path helpers for remote paths, independent of the local platform.

/// Parent directory of `remote_path`, or `None` when there is nothing to
/// create (no separator, `.`, or the root).
pub fn parent_dir(remote_path: &str) -> Option<&str> {
    let trimmed = remote_path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    let parent = trimmed[..idx].trim_end_matches('/');
    if parent.is_empty() || parent == "." {
        None
    } else {
        Some(parent)
    }
}

pub fn base_name(remote_path: &str) -> &str {
    let trimmed = remote_path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Every directory prefix of `dir`, shortest first:
/// `/srv/app/sub` → `/srv`, `/srv/app`, `/srv/app/sub`.
pub fn dir_prefixes(dir: &str) -> Vec<String> {
    let absolute = dir.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();
    for component in dir.split('/').filter(|c| !c.is_empty() && *c != ".") {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(component);
        prefixes.push(current.clone());
    }
    prefixes
}

/// Single-quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/srv/app/a.txt"), Some("/srv/app"));
        assert_eq!(parent_dir("rel/dir/a.txt"), Some("rel/dir"));
        assert_eq!(parent_dir("/srv//app//a.txt"), Some("/srv//app"));
        assert_eq!(parent_dir("/a.txt"), None);
        assert_eq!(parent_dir("a.txt"), None);
        assert_eq!(parent_dir("./a.txt"), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/srv/app/a.txt"), "a.txt");
        assert_eq!(base_name("a.txt"), "a.txt");
        assert_eq!(base_name("/srv/app/"), "app");
    }

    #[test]
    fn test_dir_prefixes() {
        assert_eq!(dir_prefixes("/srv/app/sub"), vec!["/srv", "/srv/app", "/srv/app/sub"]);
        assert_eq!(dir_prefixes("rel//x/./y"), vec!["rel", "rel/x", "rel/x/y"]);
        assert!(dir_prefixes("/").is_empty());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/srv/my app"), "'/srv/my app'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
