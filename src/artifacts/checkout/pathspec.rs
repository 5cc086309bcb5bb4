//! Path matcher
//!
//! Two-stage filtering for checkout: an ordered list of path prefixes
//! (`filepaths`) gates which subtrees are walked at all, and an optional
//! glob selects entries at map time.
//!
//! The glob is split at its longest literal leading directory prefix
//! (`pattern_root`); the prefix is folded into the walk bases so whole
//! subtrees can be pruned in O(depth), and only the remaining tail is
//! matched as a glob against base-relative paths.

use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};

const GLOB_META_CHARS: [char; 7] = ['*', '?', '[', ']', '{', '}', '!'];

#[derive(Debug)]
pub struct CheckoutFilter {
    /// Prefix gates: each filepath joined with the pattern root. An empty
    /// base admits everything.
    bases: Vec<PathBuf>,
    tail: Option<GlobMatcher>,
}

impl CheckoutFilter {
    pub fn new(filepaths: &[PathBuf], pattern: Option<&str>) -> anyhow::Result<Self> {
        let (pattern_root, pattern_tail) = match pattern {
            Some(pattern) => {
                let (root, tail) = split_pattern(pattern);
                (root, Some(tail))
            }
            None => (PathBuf::new(), None),
        };

        let bases = filepaths
            .iter()
            .map(|filepath| normalize(&filepath.join(&pattern_root)))
            .collect();

        let tail = match pattern_tail {
            Some(tail) => Some(
                GlobBuilder::new(&tail)
                    .literal_separator(true)
                    .build()?
                    .compile_matcher(),
            ),
            None => None,
        };

        Ok(CheckoutFilter { bases, tail })
    }

    /// True when `fullpath` is equal to, or a descendant of, any base.
    pub fn prefix_matches(&self, fullpath: &Path) -> bool {
        self.bases
            .iter()
            .any(|base| base.as_os_str().is_empty() || fullpath.starts_with(base))
    }

    /// The walker's descend gate: also true for ancestors of a base, so a
    /// deep base stays reachable from the root.
    pub fn worth_walking(&self, fullpath: &Path) -> bool {
        self.bases.iter().any(|base| {
            base.as_os_str().is_empty() || fullpath.starts_with(base) || base.starts_with(fullpath)
        })
    }

    /// Glob-match the base-relative remainder of `fullpath`. Vacuously true
    /// when no pattern was given.
    pub fn tail_matches(&self, fullpath: &Path) -> bool {
        let Some(tail) = &self.tail else {
            return true;
        };

        self.bases.iter().any(|base| {
            let relative = if base.as_os_str().is_empty() {
                Some(fullpath)
            } else {
                fullpath.strip_prefix(base).ok()
            };

            relative.is_some_and(|relative| {
                !relative.as_os_str().is_empty() && tail.is_match(relative)
            })
        })
    }
}

/// Split a glob into its longest literal leading directory prefix and the
/// remaining tail. The last component always belongs to the tail.
fn split_pattern(pattern: &str) -> (PathBuf, String) {
    let components: Vec<&str> = pattern.split('/').collect();

    let literal_len = components[..components.len() - 1]
        .iter()
        .take_while(|component| !component.contains(|c| GLOB_META_CHARS.contains(&c)))
        .count();

    let root: PathBuf = components[..literal_len].iter().collect();
    let tail = components[literal_len..].join("/");

    (root, tail)
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}
