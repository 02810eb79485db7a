use std::path::PathBuf;

/// Expands a leading `~` to the `$HOME` directory.
pub(crate) fn expand_path(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let rest = path[1..].trim_start_matches('/');
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_path("/srv/up"), PathBuf::from("/srv/up"));
        assert_eq!(expand_path("~user/x"), PathBuf::from("~user/x"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        assert_eq!(expand_path("~/LinShareUploads"), PathBuf::from(&home).join("LinShareUploads"));
        assert_eq!(expand_path("~"), PathBuf::from(&home));
    }
}
