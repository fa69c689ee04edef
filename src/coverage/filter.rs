use crate::coverage::sample::CoverageReport;

/// Where a coverage sample's source lives, as far as reporting is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceClass {
    /// A file on the local filesystem outside any dependency store.
    LocalFile,
    /// Protocol-qualified non-local source (https, node, data, ...) or an
    /// unattributable sample with no URL.
    Remote,
    /// A local file inside a reserved dependency directory.
    DependencyStore,
}

/// Classifies a profiler source URL.
///
/// `file://` URLs and bare filesystem paths count as local; any other scheme
/// is remote. A local path whose components include one of the configured
/// dependency directory names (component-exact, so `node_modules_extra` does
/// not match `node_modules`) is a dependency-store source. Mixed separators
/// and trailing slashes are tolerated on both the URL and the configured
/// names.
pub fn classify_source(url: &str, dependency_dirs: &[String]) -> SourceClass {
    let trimmed = url.trim();

    let path = if let Some(rest) = trimmed.strip_prefix("file://") {
        rest
    } else if has_scheme(trimmed) {
        return SourceClass::Remote;
    } else {
        trimmed
    };

    if path.is_empty() {
        return SourceClass::Remote;
    }

    let normalized = path.replace('\\', "/");
    let in_dependency_store = normalized
        .split('/')
        .filter(|component| !component.is_empty())
        .any(|component| {
            dependency_dirs
                .iter()
                .map(|dir| dir.trim().trim_end_matches(['/', '\\']))
                .filter(|dir| !dir.is_empty())
                .any(|dir| component == dir)
        });

    if in_dependency_store {
        SourceClass::DependencyStore
    } else {
        SourceClass::LocalFile
    }
}

/// Drops every sample that is not a plain local file.
pub fn filter_report(report: CoverageReport, dependency_dirs: &[String]) -> CoverageReport {
    let result = report
        .result
        .into_iter()
        .filter(|script| classify_source(&script.url, dependency_dirs) == SourceClass::LocalFile)
        .collect();
    CoverageReport::new(result)
}

fn has_scheme(url: &str) -> bool {
    let Some(colon) = url.find(':') else {
        return false;
    };
    let prefix = &url[..colon];
    // Single letters are Windows drive designators, not schemes.
    prefix.len() >= 2
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        && prefix.starts_with(|c: char| c.is_ascii_alphabetic())
}
