//! Compile-unit classification.
//!
//! Each compile group of a target is turned into a [`CompileEnv`]: system
//! and plain includes partitioned, defines unioned from the explicit list
//! and from `-D`-prefixed command fragments, and the remaining fragments
//! split into the group's flag list with shell-argument rules.
//!
//! At the whole-target level, [`app_flags`] mirrors the native three-tier
//! flag model by intersecting the C and C++ buckets into a common set. The
//! generator's fragment ordering is non-deterministic across runs, so all
//! emitted lists are sorted ascending.

use crate::codemodel::{CompileGroup, TargetConfig};
use camino::Utf8PathBuf;
use std::collections::BTreeSet;

/// Flags appended last for debug builds so generator-supplied optimization
/// flags cannot override them.
pub const DEBUG_FLAGS: &[&str] = &["-Og", "-g3", "-ggdb3"];

/// Prefix of a define expressed as a command fragment.
const DEFINE_PREFIX: &str = "-D";

/// Compiler settings for the sources of one compile group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileEnv {
    /// Language tag of the group (`C`, `CXX`, `ASM`, ...).
    pub language: String,
    /// Flags applied to every source of the group, in fragment order with
    /// the debug policy appended last when selected.
    pub flags: Vec<String>,
    /// Preprocessor defines, raw (possibly `NAME=value`).
    pub defines: Vec<String>,
    /// Plain include directories, participating in dependency tracking.
    pub include_paths: Vec<Utf8PathBuf>,
    /// System include directories, passed with the compiler's
    /// treat-as-system-header mechanism to mute vendor header warnings.
    pub sys_include_paths: Vec<Utf8PathBuf>,
}

impl CompileEnv {
    fn from_group(group: &CompileGroup, debug: bool) -> Self {
        let mut env = Self {
            language: group.language.clone(),
            ..Self::default()
        };
        for include in &group.includes {
            if include.is_system {
                env.sys_include_paths.push(include.path.clone());
            } else {
                env.include_paths.push(include.path.clone());
            }
        }
        for define in &group.defines {
            env.defines.push(define.define.clone());
        }
        for fragment in &group.compile_command_fragments {
            for token in tokenize(&fragment.fragment) {
                if let Some(define) = token.strip_prefix(DEFINE_PREFIX) {
                    env.defines.push(define.to_owned());
                } else {
                    env.flags.push(token);
                }
            }
        }
        if debug {
            env.flags.extend(DEBUG_FLAGS.iter().map(|&f| f.to_owned()));
        }
        env
    }
}

/// Whole-target flags, split the way the native graph expresses them:
/// assembler, common (C and C++), C-only, and C++-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppFlags {
    /// Assembler flags, sorted ascending.
    pub asflags: Vec<String>,
    /// Flags shared by the C and C++ compile groups, sorted ascending.
    pub common: Vec<String>,
    /// Flags supplied only by the C groups, sorted ascending.
    pub c_only: Vec<String>,
    /// Flags supplied only by the C++ groups, sorted ascending.
    pub cxx_only: Vec<String>,
}

/// Split a command fragment with shell-argument rules.
///
/// Malformed quoting degrades to whitespace splitting rather than dropping
/// the fragment.
#[must_use]
pub fn tokenize(fragment: &str) -> Vec<String> {
    shlex::split(fragment)
        .unwrap_or_else(|| fragment.split_whitespace().map(str::to_owned).collect())
}

/// Prepare one [`CompileEnv`] per compile group of `target`.
#[must_use]
pub fn prepare_compile_envs(target: &TargetConfig, debug: bool) -> Vec<CompileEnv> {
    target
        .compile_groups
        .iter()
        .map(|group| CompileEnv::from_group(group, debug))
        .collect()
}

fn language_bucket(target: &TargetConfig, language: &str) -> BTreeSet<String> {
    let mut bucket = BTreeSet::new();
    for group in target
        .compile_groups
        .iter()
        .filter(|g| g.language == language)
    {
        for fragment in &group.compile_command_fragments {
            bucket.extend(
                tokenize(&fragment.fragment)
                    .into_iter()
                    .filter(|t| !t.starts_with(DEFINE_PREFIX)),
            );
        }
    }
    bucket
}

/// Compute the three-tier flag split for a linked target.
///
/// `common = C ∩ CXX`, `c_only = C − common`, `cxx_only = CXX − common`;
/// the three sets partition the union with no overlap. A token supplied by
/// both languages for unrelated reasons still lands in the common set,
/// which is a known hazard of text-level intersection. For debug builds
/// the debug policy is appended to the per-language tiers after sorting,
/// so it stays last on the compile lines; the common tier doubles as the
/// link-flag base and must not carry compile-only debug flags.
#[must_use]
pub fn app_flags(target: &TargetConfig, debug: bool) -> AppFlags {
    let c = language_bucket(target, "C");
    let cxx = language_bucket(target, "CXX");
    let asm = language_bucket(target, "ASM");

    let common: BTreeSet<String> = c.intersection(&cxx).cloned().collect();
    let mut flags = AppFlags {
        asflags: asm.into_iter().collect(),
        c_only: c.difference(&common).cloned().collect(),
        cxx_only: cxx.difference(&common).cloned().collect(),
        common: common.into_iter().collect(),
    };
    if debug {
        let policy = DEBUG_FLAGS.iter().map(|&f| f.to_owned());
        flags.c_only.extend(policy.clone());
        flags.cxx_only.extend(policy.clone());
        flags.asflags.extend(policy);
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemodel::TargetConfig;
    use rstest::rstest;

    fn target_with_fragments(c: &str, cxx: &str) -> TargetConfig {
        let json = format!(
            r#"{{
                "name": "firmware.elf", "id": "app::@1", "type": "EXECUTABLE",
                "compileGroups": [
                    {{"language": "C", "compileCommandFragments": [{{"fragment": "{c}"}}]}},
                    {{"language": "CXX", "compileCommandFragments": [{{"fragment": "{cxx}"}}]}}
                ]
            }}"#
        );
        serde_json::from_str(&json).expect("synthetic target")
    }

    #[rstest]
    fn common_flags_partition_the_union() {
        let target = target_with_fragments(
            "-mlongcalls -Os -std=gnu99",
            "-mlongcalls -Os -std=gnu++11 -fno-rtti",
        );
        let flags = app_flags(&target, false);
        assert_eq!(flags.common, vec!["-Os", "-mlongcalls"]);
        assert_eq!(flags.c_only, vec!["-std=gnu99"]);
        assert_eq!(flags.cxx_only, vec!["-fno-rtti", "-std=gnu++11"]);
        for flag in &flags.common {
            assert!(!flags.c_only.contains(flag));
            assert!(!flags.cxx_only.contains(flag));
        }
    }

    #[rstest]
    fn debug_policy_lands_in_the_language_tiers_only() {
        let target = target_with_fragments("-Os -std=gnu99", "-Os -std=gnu++11");
        let flags = app_flags(&target, true);
        assert_eq!(flags.common, vec!["-Os"]);
        assert_eq!(flags.c_only, vec!["-std=gnu99", "-Og", "-g3", "-ggdb3"]);
        assert_eq!(flags.cxx_only, vec!["-std=gnu++11", "-Og", "-g3", "-ggdb3"]);
        assert_eq!(flags.asflags, vec!["-Og", "-g3", "-ggdb3"]);
    }

    #[rstest]
    fn defines_come_from_both_sources() {
        let json = r#"{
            "name": "main", "id": "main::@1", "type": "STATIC_LIBRARY",
            "compileGroups": [{
                "language": "C",
                "defines": [{"define": "ESP_PLATFORM"}],
                "compileCommandFragments": [{"fragment": "-DF_CPU=240000000L -Os"}]
            }]
        }"#;
        let target: TargetConfig = serde_json::from_str(json).expect("target");
        let envs = prepare_compile_envs(&target, false);
        let env = envs.first().expect("env");
        assert_eq!(env.defines, vec!["ESP_PLATFORM", "F_CPU=240000000L"]);
        assert_eq!(env.flags, vec!["-Os"]);
    }

    #[rstest]
    fn debug_flags_are_appended_last() {
        let json = r#"{
            "name": "main", "id": "main::@1", "type": "STATIC_LIBRARY",
            "compileGroups": [{
                "language": "C",
                "compileCommandFragments": [{"fragment": "-O2"}]
            }]
        }"#;
        let target: TargetConfig = serde_json::from_str(json).expect("target");
        let envs = prepare_compile_envs(&target, true);
        let env = envs.first().expect("env");
        assert_eq!(env.flags, vec!["-O2", "-Og", "-g3", "-ggdb3"]);
    }
}
