//! Ordered rule engine resolving relative paths to content descriptors.

use std::collections::HashMap;
use std::path::Path;

use crate::content::{normalize_path, ContentDescriptor, ContentRule, RuleAction};
use crate::error::BuildError;

/// Result of resolving a path against a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Handled with this descriptor
    Include(ContentDescriptor),
    /// Explicitly or by rule excluded
    Exclude,
    /// Nothing matched at all
    NotHandled,
}

impl Resolution {
    pub fn is_handled(&self) -> bool {
        matches!(self, Resolution::Include(_))
    }
}

/// Maps relative source paths to content descriptors.
///
/// Resolution order:
/// 1. The explicit per-path table. An exact entry always wins, including an
///    explicit exclude.
/// 2. Pattern rules, scanned most-recently-registered first. The first
///    match in that order applies.
/// 3. Otherwise the path is not handled.
///
/// Registering a new pattern rule removes explicit entries that match its
/// pattern, so a stale single-file override cannot mask a later rule.
#[derive(Debug, Default)]
pub struct ContentCollection {
    /// Exact path -> descriptor; `None` marks an explicit exclude
    explicit: HashMap<String, Option<ContentDescriptor>>,
    /// Pattern rules in registration order
    rules: Vec<ContentRule>,
}

impl ContentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an explicit per-file descriptor.
    pub fn include(&mut self, path: &str, descriptor: ContentDescriptor) {
        self.explicit
            .insert(normalize_path(path), Some(descriptor));
    }

    /// Register an explicit per-file exclude. Beats any rule for this path.
    pub fn exclude(&mut self, path: &str) {
        self.explicit.insert(normalize_path(path), None);
    }

    /// Register a pattern rule. Later rules take precedence over earlier
    /// ones, and explicit entries matching the new pattern are dropped.
    pub fn add_rule(&mut self, rule: ContentRule) {
        self.explicit.retain(|path, _| !rule.is_match(path));
        self.rules.push(rule);
    }

    /// Convenience: include every file matching a wildcard pattern.
    pub fn include_pattern(
        &mut self,
        pattern: &str,
        descriptor: ContentDescriptor,
    ) -> Result<(), BuildError> {
        let rule = ContentRule::wildcard(pattern, RuleAction::Include(descriptor))?;
        self.add_rule(rule);
        Ok(())
    }

    /// Convenience: exclude every file matching a wildcard pattern.
    pub fn exclude_pattern(&mut self, pattern: &str) -> Result<(), BuildError> {
        let rule = ContentRule::wildcard(pattern, RuleAction::Exclude)?;
        self.add_rule(rule);
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn explicit_count(&self) -> usize {
        self.explicit.len()
    }

    /// Resolve a relative path to its descriptor.
    pub fn resolve(&self, path: &str) -> Resolution {
        let path = normalize_path(path);

        if let Some(entry) = self.explicit.get(&path) {
            return match entry {
                Some(descriptor) => Resolution::Include(descriptor.clone()),
                None => Resolution::Exclude,
            };
        }

        for rule in self.rules.iter().rev() {
            if rule.is_match(&path) {
                return match rule.action() {
                    RuleAction::Include(descriptor) => Resolution::Include(descriptor.clone()),
                    RuleAction::Exclude => Resolution::Exclude,
                };
            }
        }

        Resolution::NotHandled
    }

    /// Walk a source tree and yield every handled file with its descriptor,
    /// in sorted path order. A missing source directory yields no files.
    pub fn scan(&self, source_dir: &Path) -> Result<Vec<(String, ContentDescriptor)>, BuildError> {
        if !source_dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        walk(source_dir, source_dir, &mut files)?;
        files.sort();

        let mut handled = Vec::new();
        for relative in files {
            if let Resolution::Include(descriptor) = self.resolve(&relative) {
                handled.push((relative, descriptor));
            }
        }
        Ok(handled)
    }
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), BuildError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("error reading directory entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(normalize_path(&relative.to_string_lossy()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn build_all() -> ContentDescriptor {
        ContentDescriptor::build(None, None)
    }

    #[test]
    fn test_explicit_include_wins_over_rules() {
        let mut c = ContentCollection::new();
        c.exclude_pattern("**/*.png").unwrap();
        c.include("tex.png", build_all().with_content_root("override"));

        match c.resolve("tex.png") {
            Resolution::Include(d) => assert_eq!(d.content_root(), "override"),
            other => panic!("expected include, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_exclude_wins_over_rules() {
        let mut c = ContentCollection::new();
        c.include_pattern("**/*.png", build_all()).unwrap();
        c.exclude("secret.png");

        assert_eq!(c.resolve("secret.png"), Resolution::Exclude);
        assert!(c.resolve("other.png").is_handled());
    }

    #[test]
    fn test_last_registered_rule_wins() {
        let mut c = ContentCollection::new();
        c.include_pattern("**/*.png", build_all().with_content_root("first"))
            .unwrap();
        c.include_pattern("**/*.png", build_all().with_content_root("second"))
            .unwrap();

        match c.resolve("p.png") {
            Resolution::Include(d) => assert_eq!(d.content_root(), "second"),
            other => panic!("expected include, got {:?}", other),
        }
    }

    #[test]
    fn test_exclusion_rule_later_than_include() {
        let mut c = ContentCollection::new();
        c.include_pattern("**/*.png", build_all()).unwrap();
        c.exclude_pattern("tmp/**").unwrap();

        assert_eq!(c.resolve("tmp/scratch.png"), Resolution::Exclude);
        assert!(c.resolve("real/tex.png").is_handled());
    }

    #[test]
    fn test_unmatched_is_not_handled() {
        let c = ContentCollection::new();
        assert_eq!(c.resolve("anything.png"), Resolution::NotHandled);
    }

    #[test]
    fn test_new_rule_evicts_matching_explicit_entries() {
        let mut c = ContentCollection::new();
        c.include("tex.png", build_all().with_content_root("stale"));
        assert_eq!(c.explicit_count(), 1);

        c.include_pattern("**/*.png", build_all().with_content_root("rule"))
            .unwrap();
        assert_eq!(c.explicit_count(), 0);

        // The rule now governs the path
        match c.resolve("tex.png") {
            Resolution::Include(d) => assert_eq!(d.content_root(), "rule"),
            other => panic!("expected include, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_registered_after_rule_sticks() {
        let mut c = ContentCollection::new();
        c.include_pattern("**/*.png", build_all().with_content_root("rule"))
            .unwrap();
        c.include("tex.png", build_all().with_content_root("explicit"));

        match c.resolve("tex.png") {
            Resolution::Include(d) => assert_eq!(d.content_root(), "explicit"),
            other => panic!("expected include, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_eviction_spares_unmatched_entries() {
        let mut c = ContentCollection::new();
        c.include("keep.wav", build_all());
        c.include("drop.png", build_all());
        c.include_pattern("**/*.png", build_all()).unwrap();

        assert_eq!(c.explicit_count(), 1);
        assert!(c.resolve("keep.wav").is_handled());
    }

    #[test]
    fn test_scan_yields_sorted_handled_files() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "b.png", "b");
        create_test_file(temp.path(), "a.png", "a");
        create_test_file(temp.path(), "sub/c.png", "c");
        create_test_file(temp.path(), "notes.txt", "skip me");

        let mut c = ContentCollection::new();
        c.include_pattern("**/*.png", build_all()).unwrap();

        let scanned = c.scan(temp.path()).unwrap();
        let paths: Vec<&str> = scanned.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["a.png", "b.png", "sub/c.png"]);
    }

    #[test]
    fn test_scan_respects_excludes() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "tex.png", "x");
        create_test_file(temp.path(), "tmp/scratch.png", "y");

        let mut c = ContentCollection::new();
        c.include_pattern("**/*.png", build_all()).unwrap();
        c.exclude_pattern("tmp/**").unwrap();

        let scanned = c.scan(temp.path()).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].0, "tex.png");
    }
}
