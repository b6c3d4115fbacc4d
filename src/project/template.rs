//! Placeholder expansion for descriptor strings
//!
//! Recognized placeholders: `{cc}`, `{cxx}`, `{flags}`, `{source}`,
//! `{bench_source}`, `{build}`, `{install}`, `{jobs}`. Unknown placeholders
//! are left untouched.

use std::collections::BTreeMap;

use crate::flags::FlagSet;

use super::ProjectLayout;

/// Placeholder that splices one argument per flag token.
pub const FLAGS_PLACEHOLDER: &str = "{flags}";

/// Values substituted into descriptor templates for one adapter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    vars: BTreeMap<&'static str, String>,
    flags: Vec<String>,
}

impl TemplateContext {
    /// Context for one project, compiler pair and flag set.
    #[must_use]
    pub fn new(layout: &ProjectLayout, cc: &str, cxx: &str, flags: &FlagSet, jobs: usize) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert("cc", cc.to_string());
        vars.insert("cxx", cxx.to_string());
        vars.insert("flags", flags.joined());
        vars.insert("source", layout.source.display().to_string());
        vars.insert("bench_source", layout.bench.display().to_string());
        vars.insert("build", layout.build.display().to_string());
        vars.insert("install", layout.install.display().to_string());
        vars.insert("jobs", jobs.to_string());
        Self {
            vars,
            flags: flags.tokens().to_vec(),
        }
    }

    /// Value bound to a placeholder name (without braces).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Substitute every known placeholder inside `template`.
    ///
    /// `{flags}` inside a larger string becomes the space-joined flags,
    /// e.g. `-DCMAKE_C_FLAGS={flags}`.
    #[must_use]
    pub fn expand(&self, template: &str) -> String {
        if !template.contains('{') {
            return template.to_string();
        }
        self.vars.iter().fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        })
    }

    /// Expand an argument list.
    ///
    /// An argument that is exactly `{flags}` becomes one argument per flag
    /// token (none if the flag set is empty).
    #[must_use]
    pub fn expand_args(&self, args: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(args.len() + self.flags.len());
        for arg in args {
            if arg == FLAGS_PLACEHOLDER {
                out.extend(self.flags.iter().cloned());
            } else {
                out.push(self.expand(arg));
            }
        }
        out
    }

    /// Expand the values of an environment map.
    #[must_use]
    pub fn expand_env(&self, env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        env.iter()
            .map(|(k, v)| (k.clone(), self.expand(v)))
            .collect()
    }
}
