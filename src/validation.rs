/// Test that a replay target is safe to redirect to later.
///
/// The target must be a path on this host, at or below `root`. Absolute URLs,
/// protocol-relative URLs and parent-directory segments are rejected, as is the empty string.
/// A plain prefix match is not enough: with root `/lti_provider`, the path
/// `/lti_provider_evil` is rejected.
pub fn is_safe_target(target: &str, root: &str) -> bool {
    if target.is_empty() {
        return false;
    }

    match target.strip_prefix(root) {
        Some("") => {}
        Some(rest) if rest.starts_with('/') => {}
        _ => return false,
    }

    !(target.contains("://") || target.starts_with("//") || target.contains(".."))
}

#[cfg(test)]
mod tests {
    use super::is_safe_target;

    const ROOT: &str = "/lti_provider";

    #[test]
    fn accepts_paths_below_root() {
        for target in &[
            "/lti_provider",
            "/lti_provider/",
            "/lti_provider/course/1",
            "/lti_provider/x",
            "/lti_provider/launch?resource=5",
        ] {
            assert!(
                is_safe_target(target, ROOT),
                "unexpectedly rejected target: {target}"
            );
        }
    }

    #[test]
    fn rejects_paths_outside_root() {
        for target in &[
            "",
            "/",
            "/admin",
            "lti_provider/course/1",
            "/lti_provider_evil",
            "/lti_providerx/course",
            "/LTI_PROVIDER/course",
            " /lti_provider/course",
        ] {
            assert!(
                !is_safe_target(target, ROOT),
                "did not reject target: {target}"
            );
        }
    }

    #[test]
    fn rejects_urls_and_traversal() {
        for target in &[
            "https://evil.example/lti_provider/x",
            "//evil.example/lti_provider",
            "/lti_provider/../x",
            "/lti_provider/..",
            "/lti_provider/redirect?to=https://evil.example",
            "/lti_provider/a/..%2f/b/..",
        ] {
            assert!(
                !is_safe_target(target, ROOT),
                "did not reject target: {target}"
            );
        }
    }

    #[test]
    fn honors_configured_root() {
        assert!(is_safe_target("/tools/quiz", "/tools"));
        assert!(!is_safe_target("/lti_provider/quiz", "/tools"));
        // Configuring `/` normalizes to an empty root, which allows any local path.
        assert!(is_safe_target("/anything", ""));
        assert!(!is_safe_target("//evil.example", ""));
        assert!(!is_safe_target("anything", ""));
    }
}
