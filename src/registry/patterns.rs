// src/registry/patterns.rs

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use regex::{Regex, RegexBuilder};

use crate::errors::{PipelineError, Result};
use crate::types::PatternType;

/// Compiled file pattern used by recognizers, excludes and builders.
///
/// Wildcards are case-insensitive and `*` crosses directory separators, so
/// `*.png` matches `textures/rock.png`. Regexes are case-insensitive and are
/// searched (not anchored) in the scan-folder-relative path.
#[derive(Clone)]
pub struct PatternMatcher {
    pattern: String,
    pattern_type: PatternType,
    compiled: Compiled,
}

#[derive(Clone)]
enum Compiled {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl fmt::Debug for PatternMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternMatcher")
            .field("pattern", &self.pattern)
            .field("pattern_type", &self.pattern_type)
            .finish()
    }
}

impl PatternMatcher {
    pub fn new(pattern: &str, pattern_type: PatternType) -> Result<Self> {
        let compiled = match pattern_type {
            PatternType::Wildcard => {
                let glob = GlobBuilder::new(pattern)
                    .case_insensitive(true)
                    .literal_separator(false)
                    .build()
                    .map_err(|e| {
                        PipelineError::PatternError(format!("invalid glob pattern '{pattern}': {e}"))
                    })?;
                Compiled::Glob(glob.compile_matcher())
            }
            PatternType::Regex => {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        PipelineError::PatternError(format!("invalid regex '{pattern}': {e}"))
                    })?;
                Compiled::Regex(re)
            }
        };

        Ok(Self {
            pattern: pattern.to_string(),
            pattern_type,
            compiled,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    /// Match against a forward-slash relative path such as `"ui/icon.png"`.
    pub fn matches(&self, rel_path: &str) -> bool {
        match &self.compiled {
            Compiled::Glob(glob) => glob.is_match(rel_path),
            Compiled::Regex(re) => re.is_match(rel_path),
        }
    }
}
