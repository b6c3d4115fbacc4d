//! Flag category table
//!
//! Each category lists mutually exclusive clang variants; a flag set takes
//! at most one variant per category.

/// A named group of mutually exclusive flag variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagCategory {
    /// Category name (e.g. `"O"`, `"flto"`)
    pub name: &'static str,
    /// Mutually exclusive flag tokens
    pub variants: &'static [&'static str],
}

/// Name of the optimization-level category.
pub const OPT_LEVEL: &str = "O";

/// The full categorical flag space, in declaration order.
pub static FLAG_TABLE: &[FlagCategory] = &[
    FlagCategory {
        name: OPT_LEVEL,
        variants: &["-O1", "-O2", "-O3", "-Os", "-Ofast"],
    },
    FlagCategory {
        name: "flto",
        variants: &["-flto", "-flto=full", "-flto=thin", "-flto=auto", "-funified-lto"],
    },
    FlagCategory {
        name: "flto-jobs",
        variants: &["-flto-jobs=1", "-flto-jobs=4", "-flto-jobs=8"],
    },
    FlagCategory {
        name: "arch",
        variants: &["-march=native", "-mtune=native"],
    },
    FlagCategory {
        name: "vec_width",
        variants: &[
            "-mprefer-vector-width=128",
            "-mprefer-vector-width=256",
            "-mprefer-vector-width=none",
        ],
    },
    FlagCategory {
        name: "recip",
        variants: &["-mrecip", "-mrecip=all"],
    },
    FlagCategory {
        name: "branch_align",
        variants: &["-malign-branch=fused,jcc", "-malign-branch-boundary=32"],
    },
    FlagCategory {
        name: "sse2avx",
        variants: &["-msse2avx"],
    },
    FlagCategory {
        name: "inline",
        variants: &[
            "-finline-functions",
            "-finline-hint-functions",
            "-finline-max-stacksize=512",
            "-fno-inline-functions",
        ],
    },
    FlagCategory {
        name: "vectorize",
        variants: &["-fvectorize", "-fslp-vectorize", "-fno-vectorize"],
    },
    FlagCategory {
        name: "unroll",
        variants: &["-funroll-loops", "-fno-unroll-loops"],
    },
    FlagCategory {
        name: "sections",
        variants: &["-ffunction-sections", "-fdata-sections", "-fmerge-all-constants"],
    },
    FlagCategory {
        name: "fast_math",
        variants: &[
            "-ffast-math",
            "-funsafe-math-optimizations",
            "-ffinite-math-only",
            "-fapprox-func",
            "-freciprocal-math",
            "-fno-signed-zeros",
            "-ffp-contract=fast",
            "-ffp-contract=off",
        ],
    },
    FlagCategory {
        name: "strict",
        variants: &[
            "-fstrict-aliasing",
            "-fno-strict-aliasing",
            "-fstrict-enums",
            "-fstrict-vtable-pointers",
            "-fno-delete-null-pointer-checks",
            "-fomit-frame-pointer",
            "-fno-omit-frame-pointer",
        ],
    },
    FlagCategory {
        name: "whole_prog",
        variants: &[
            "-fwhole-program-vtables",
            "-fvirtual-function-elimination",
            "-funique-basic-block-section-names",
        ],
    },
    FlagCategory {
        name: "stack_prot",
        variants: &[
            "-fstack-protector",
            "-fstack-protector-strong",
            "-fstack-protector-all",
            "-fstack-clash-protection",
        ],
    },
];

/// Look up a category by name.
#[must_use]
pub fn category(name: &str) -> Option<&'static FlagCategory> {
    FLAG_TABLE.iter().find(|c| c.name == name)
}

/// The category a token belongs to, if it is in the table.
#[must_use]
pub fn category_of(token: &str) -> Option<&'static FlagCategory> {
    FLAG_TABLE.iter().find(|c| c.variants.contains(&token))
}

/// Optimization-level variants.
#[must_use]
pub fn opt_levels() -> &'static [&'static str] {
    category(OPT_LEVEL).map_or(&[], |c| c.variants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_category_names_unique() {
        let names: HashSet<_> = FLAG_TABLE.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), FLAG_TABLE.len());
    }

    #[test]
    fn test_tokens_belong_to_one_category() {
        let mut seen = HashSet::new();
        for cat in FLAG_TABLE {
            assert!(!cat.variants.is_empty(), "empty category {}", cat.name);
            for v in cat.variants {
                assert!(seen.insert(*v), "{v} listed twice");
            }
        }
    }

    #[test]
    fn test_opt_levels() {
        assert_eq!(opt_levels(), &["-O1", "-O2", "-O3", "-Os", "-Ofast"]);
        assert_eq!(category_of("-Ofast").map(|c| c.name), Some(OPT_LEVEL));
        assert!(category_of("-Wall").is_none());
    }
}
