//! Call-site resolution
//!
//! Turns the location of a breakpoint into the ordered list of keys probed
//! against the rule table. Earlier keys are more specific and win: a rule for
//! `/abs/path/conn.rs:42` beats one for `net.conn.flush`, which beats one for
//! the whole `conn` module.

use crate::rules::LookupKey;
use std::path::{Path, PathBuf};

/// Where a breakpoint check was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Source file as reported by the compiler (may be relative)
    pub file: PathBuf,
    pub line: u32,
    /// Bare function name, without its module path
    pub function: String,
    /// `module_path!()` of the caller, e.g. `mycrate::net::conn`
    pub module_path: Option<String>,
    /// Manifest directory of the calling crate; anchors a relative `file`
    pub source_root: Option<PathBuf>,
}

impl CallSite {
    pub fn new(file: impl Into<PathBuf>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            module_path: None,
            source_root: None,
        }
    }

    pub fn with_module_path(mut self, module_path: impl Into<String>) -> Self {
        self.module_path = Some(module_path.into());
        self
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Absolute form of the file path.
    ///
    /// `file!()` is relative to the workspace root, which is the source root
    /// or one of its ancestors; the first of those holding the file wins.
    /// Otherwise the path is resolved against the current directory.
    pub fn absolute_path(&self) -> PathBuf {
        if self.file.is_relative() {
            if let Some(root) = &self.source_root {
                if let Some(found) = root
                    .ancestors()
                    .map(|dir| dir.join(&self.file))
                    .find(|candidate| candidate.is_file())
                {
                    return found;
                }
            }
        }
        std::path::absolute(&self.file).unwrap_or_else(|_| self.file.clone())
    }

    /// Absolute path with symlinks resolved; falls back to
    /// [`absolute_path`](Self::absolute_path) when the file is not on disk.
    pub fn resolved_path(&self) -> PathBuf {
        let absolute = self.absolute_path();
        std::fs::canonicalize(&absolute).unwrap_or(absolute)
    }

    /// File name including extension.
    pub fn basename(&self) -> String {
        file_name(&self.file)
    }

    /// File name without its final extension.
    pub fn module(&self) -> String {
        let base = self.basename();
        match base.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => base,
        }
    }

    /// Name of the directory holding the file.
    fn directory_name(&self) -> String {
        self.file.parent().map(file_name).unwrap_or_default()
    }

    /// Dotted module path (`mycrate.net.conn`). Without a module path the
    /// directory name heuristic `dir.module` is used.
    pub fn qualified_package(&self) -> String {
        match self.module_segments() {
            Some(segments) => segments.join("."),
            None => format!("{}.{}", self.directory_name(), self.module()),
        }
    }

    /// Package enclosing the module: the penultimate module path segment, or
    /// the directory name when the module path has no parent.
    pub fn parent_package(&self) -> String {
        match self.module_segments() {
            Some(segments) if segments.len() >= 2 => segments[segments.len() - 2].to_string(),
            _ => self.directory_name(),
        }
    }

    fn module_segments(&self) -> Option<Vec<&str>> {
        let path = self.module_path.as_deref()?;
        let segments: Vec<&str> = path.split("::").filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            None
        } else {
            Some(segments)
        }
    }

    /// Candidate rule keys, most specific first, ending with the default.
    pub fn lookup_keys(&self) -> Vec<LookupKey> {
        let absolute = self.absolute_path().display().to_string();
        let resolved = self.resolved_path().display().to_string();
        let line = self.line;
        let function = &self.function;
        let basename = self.basename();
        let module = self.module();
        let qualified = self.qualified_package();
        let parent = self.parent_package();

        let patterns = [
            format!("{absolute}:{line}"),
            format!("{resolved}:{line}"),
            format!("{qualified}.{function}:{line}"),
            format!("{qualified}.{function}"),
            format!("{parent}.{module}.{function}:{line}"),
            format!("{parent}.{module}:{line}"),
            format!("{parent}.{basename}:{line}"),
            format!("{parent}.{basename}"),
            format!("{parent}.{module}.{function}"),
            format!("{parent}.{module}"),
            format!("{basename}:{line}"),
            format!("{module}.{function}"),
            absolute,
            basename,
            module,
        ];

        patterns
            .into_iter()
            .map(LookupKey::Pattern)
            .chain(std::iter::once(LookupKey::Default))
            .collect()
    }

    /// Line written to the call audit log.
    pub fn audit_entry(&self) -> String {
        format!(
            "{:?}:{}/{}:{}",
            self.file.display().to_string(),
            self.line,
            self.qualified_package(),
            self.function
        )
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extract the enclosing function name from the type name of a probe
/// function declared inside it, e.g. `app::net::flush::__probe` or
/// `app::run::{{closure}}::__probe`.
pub fn function_name_from_type_name(type_name: &str) -> String {
    let mut segments: Vec<&str> = type_name.split("::").collect();
    if segments.last() == Some(&"__probe") {
        segments.pop();
    }
    while segments.last() == Some(&"{{closure}}") {
        segments.pop();
    }
    segments.last().copied().unwrap_or_default().to_string()
}

/// Capture the current [`CallSite`].
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __probe() {}
        $crate::CallSite::new(
            file!(),
            line!(),
            $crate::callsite::function_name_from_type_name(::std::any::type_name_of_val(
                &__probe,
            )),
        )
        .with_module_path(module_path!())
        .with_source_root(env!("CARGO_MANIFEST_DIR"))
    }};
}

/// Check the current call site and, if a rule fires, pause or prompt.
///
/// `breakpoint!()` uses the process-wide engine (see [`crate::install`]);
/// `breakpoint!(engine)` uses an explicit `&mut Engine`.
#[macro_export]
macro_rules! breakpoint {
    () => {
        $crate::check_global(&$crate::call_site!())
    };
    ($engine:expr) => {
        $crate::Engine::check($engine, &$crate::call_site!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(site: &CallSite) -> Vec<String> {
        site.lookup_keys().iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_lookup_key_order_with_module_path() {
        let site = CallSite::new("/no/such/app/src/net/conn.rs", 42, "flush")
            .with_module_path("app::net::conn");
        let keys = keys(&site);
        assert_eq!(
            keys,
            vec![
                "/no/such/app/src/net/conn.rs:42",
                "/no/such/app/src/net/conn.rs:42",
                "app.net.conn.flush:42",
                "app.net.conn.flush",
                "net.conn.flush:42",
                "net.conn:42",
                "net.conn.rs:42",
                "net.conn.rs",
                "net.conn.flush",
                "net.conn",
                "conn.rs:42",
                "conn.flush",
                "/no/such/app/src/net/conn.rs",
                "conn.rs",
                "conn",
                "<default>",
            ]
        );
    }

    #[test]
    fn test_directory_heuristic_without_module_path() {
        let site = CallSite::new("/a/b.src", 10, "f");
        assert_eq!(site.qualified_package(), "a.b");
        assert_eq!(site.parent_package(), "a");
        let keys = site.lookup_keys();
        assert_eq!(keys[0], LookupKey::Pattern("/a/b.src:10".into()));
        assert_eq!(keys[1], LookupKey::Pattern("/a/b.src:10".into()));
        assert_eq!(keys[2], LookupKey::Pattern("a.b.f:10".into()));
        assert_eq!(keys.len(), 16);
        assert_eq!(keys.last(), Some(&LookupKey::Default));
    }

    #[test]
    fn test_single_segment_module_path_uses_directory() {
        let site = CallSite::new("/w/src/lib.rs", 3, "main").with_module_path("app");
        assert_eq!(site.qualified_package(), "app");
        assert_eq!(site.parent_package(), "src");
        assert_eq!(site.module(), "lib");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolved_path_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.rs");
        std::fs::write(&real, "").unwrap();
        let link = dir.path().join("link.rs");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let site = CallSite::new(&link, 7, "f");
        let keys = keys(&site);
        assert_eq!(keys[0], format!("{}:7", link.display()));
        assert_eq!(
            keys[1],
            format!("{}:7", std::fs::canonicalize(&real).unwrap().display())
        );
        assert_eq!(site.basename(), "link.rs");
    }

    #[test]
    fn test_relative_path_made_absolute() {
        let site = CallSite::new("src/x.rs", 1, "f");
        assert!(site.absolute_path().is_absolute());
        assert!(site.absolute_path().ends_with("src/x.rs"));
    }

    #[test]
    fn test_relative_path_anchored_at_source_root() {
        let dir = tempfile::tempdir().unwrap();
        let member = dir.path().join("member");
        std::fs::create_dir_all(member.join("src")).unwrap();
        std::fs::write(member.join("src/lib.rs"), "").unwrap();

        // Workspace-relative, as `file!()` reports it for a member crate.
        let site = CallSite::new("member/src/lib.rs", 3, "f").with_source_root(&member);
        assert_eq!(site.absolute_path(), member.join("src/lib.rs"));

        // Crate-relative resolves against the root itself.
        let site = CallSite::new("src/lib.rs", 3, "f").with_source_root(&member);
        assert_eq!(site.absolute_path(), member.join("src/lib.rs"));

        // Not found anywhere: fall back to the current directory.
        let site = CallSite::new("gone.rs", 3, "f").with_source_root(&member);
        assert_eq!(site.absolute_path(), std::path::absolute("gone.rs").unwrap());
    }

    #[test]
    fn test_macro_site_names_real_file() {
        let site = crate::call_site!();
        let absolute = site.absolute_path();
        assert!(absolute.exists(), "{} does not exist", absolute.display());
        let keys = keys(&site);
        assert!(keys[0].starts_with(&absolute.display().to_string()));
        assert_eq!(keys[12], absolute.display().to_string());
    }

    #[test]
    fn test_module_without_extension() {
        assert_eq!(CallSite::new("/a/Makefile", 1, "f").module(), "Makefile");
        assert_eq!(CallSite::new("/a/.hidden", 1, "f").module(), ".hidden");
    }

    #[test]
    fn test_function_name_from_type_name() {
        assert_eq!(function_name_from_type_name("app::net::flush::__probe"), "flush");
        assert_eq!(
            function_name_from_type_name("app::run::{{closure}}::{{closure}}::__probe"),
            "run"
        );
        assert_eq!(function_name_from_type_name("main"), "main");
    }

    #[test]
    fn test_call_site_macro() {
        let site = crate::call_site!();
        assert_eq!(site.function, "test_call_site_macro");
        assert_eq!(site.module_path.as_deref(), Some(module_path!()));
        assert!(site.file.ends_with("callsite.rs"));
        assert_eq!(site.qualified_package(), "breakchoice.callsite.tests");
    }

    #[test]
    fn test_audit_entry_format() {
        let site = CallSite::new("/a/b.rs", 5, "go").with_module_path("x::b");
        assert_eq!(site.audit_entry(), "\"/a/b.rs\":5/x.b:go");
    }
}
