//! Link-argument classification.
//!
//! The generator describes a target's link command as a list of fragments
//! tagged only with a coarse role (`flags` or `libraries`). Everything finer
//! is a heuristic over the fragment text, modelled here as a prioritized
//! rule list: each `libraries` fragment is classified into exactly one
//! [`FragmentShape`], tested in fixed precedence order, and exactly one
//! output bucket receives content derived from it. This cascade is the only
//! way implicit inter-component dependencies are discovered when the
//! generator omits an explicit graph edge.

use crate::codemodel::TargetConfig;
use crate::flags::tokenize;
use camino::{Utf8Path, Utf8PathBuf};

/// Role tag of fragments carrying linker flags.
const ROLE_FLAGS: &str = "flags";
/// Role tag of fragments carrying libraries.
const ROLE_LIBRARIES: &str = "libraries";

/// Classified link arguments of one target.
///
/// `linkflags` and `libpaths` behave as ordered sets (first-seen order,
/// deduplicated); `libs` and `implicit_lib_deps` preserve every occurrence
/// in fragment order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedLinkArgs {
    /// Generic linker flags.
    pub linkflags: Vec<String>,
    /// Libraries to link: `-l` tokens verbatim, archive file names bare.
    pub libs: Vec<String>,
    /// Library search paths.
    pub libpaths: Vec<Utf8PathBuf>,
    /// Archive names referenced by fragment text without an explicit graph
    /// edge; matched against component artifact names by the resolver.
    pub implicit_lib_deps: Vec<String>,
}

/// Shape of one `libraries`-role fragment, in classification precedence
/// order. Later shapes are only reached when earlier prefix tests fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentShape {
    /// Starts with `-l`: one or more library tokens.
    LibraryTokens(Vec<String>),
    /// Starts with `-L`: a library search path.
    SearchPath(Utf8PathBuf),
    /// Starts with `-` but is neither: a linker flag the generator tagged
    /// under the libraries role.
    MisroledFlag(Vec<String>),
    /// An absolute path to an existing file: its directory plus every
    /// archive token it names.
    ExistingFile {
        /// Directory containing the file.
        dir: Utf8PathBuf,
        /// File names of `.a` tokens within the fragment.
        archives: Vec<String>,
    },
    /// Ends with `.a` without being an absolute existing file: archive
    /// names the generator exposed as text only.
    ImplicitArchives(Vec<String>),
    /// Anything else; contributes nothing.
    Opaque,
}

fn archive_names(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .filter(|t| t.ends_with(".a"))
        .map(|t| {
            Utf8Path::new(t)
                .file_name()
                .map_or_else(|| t.clone(), str::to_owned)
        })
        .collect()
}

/// Classify one `libraries`-role fragment by its literal prefix.
#[must_use]
pub fn classify_fragment(fragment: &str) -> FragmentShape {
    let trimmed = fragment.trim();
    let tokens = tokenize(trimmed);
    if trimmed.starts_with("-l") {
        return FragmentShape::LibraryTokens(tokens);
    }
    if let Some(path) = trimmed.strip_prefix("-L") {
        return FragmentShape::SearchPath(Utf8PathBuf::from(path.trim().trim_matches('"')));
    }
    if trimmed.starts_with('-') {
        return FragmentShape::MisroledFlag(tokens);
    }
    let path = Utf8Path::new(trimmed);
    if path.is_absolute() && path.is_file() {
        let dir = path
            .parent()
            .map_or_else(Utf8PathBuf::new, Utf8Path::to_path_buf);
        return FragmentShape::ExistingFile {
            dir,
            archives: archive_names(&tokens),
        };
    }
    if trimmed.ends_with(".a") {
        return FragmentShape::ImplicitArchives(archive_names(&tokens));
    }
    FragmentShape::Opaque
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Classify every link-command fragment of `target`.
#[must_use]
pub fn extract_link_args(target: &TargetConfig) -> ResolvedLinkArgs {
    let mut args = ResolvedLinkArgs::default();
    let Some(link) = &target.link else {
        return args;
    };
    for fragment in &link.command_fragments {
        match fragment.role.as_str() {
            ROLE_FLAGS => {
                for token in tokenize(&fragment.fragment) {
                    push_unique(&mut args.linkflags, token);
                }
            }
            ROLE_LIBRARIES => apply_shape(&mut args, classify_fragment(&fragment.fragment)),
            _ => {}
        }
    }
    args
}

fn apply_shape(args: &mut ResolvedLinkArgs, shape: FragmentShape) {
    match shape {
        FragmentShape::LibraryTokens(tokens) => args.libs.extend(tokens),
        FragmentShape::SearchPath(path) => push_unique(&mut args.libpaths, path),
        FragmentShape::MisroledFlag(tokens) => {
            for token in tokens {
                push_unique(&mut args.linkflags, token);
            }
        }
        FragmentShape::ExistingFile { dir, archives } => {
            push_unique(&mut args.libpaths, dir);
            args.libs.extend(archives);
        }
        FragmentShape::ImplicitArchives(archives) => args.implicit_lib_deps.extend(archives),
        FragmentShape::Opaque => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("-lm -lc", FragmentShape::LibraryTokens(vec!["-lm".into(), "-lc".into()]))]
    #[case("-L/sdk/ld", FragmentShape::SearchPath("/sdk/ld".into()))]
    #[case(
        "-Wl,--gc-sections",
        FragmentShape::MisroledFlag(vec!["-Wl,--gc-sections".into()])
    )]
    #[case(
        "esp-idf/libb/libb.a",
        FragmentShape::ImplicitArchives(vec!["libb.a".into()])
    )]
    #[case("CMakeFiles/extra.dir", FragmentShape::Opaque)]
    fn cascade_selects_one_shape(#[case] fragment: &str, #[case] expected: FragmentShape) {
        assert_eq!(classify_fragment(fragment), expected);
    }

    #[rstest]
    fn misroled_flag_reaches_linkflags() {
        let json = r#"{
            "name": "app.elf", "id": "app::@1", "type": "EXECUTABLE",
            "link": {"commandFragments": [
                {"fragment": "-Wl,--cref", "role": "libraries"},
                {"fragment": "-nostdlib", "role": "flags"}
            ]}
        }"#;
        let target: TargetConfig = serde_json::from_str(json).expect("target");
        let args = extract_link_args(&target);
        assert_eq!(args.linkflags, vec!["-Wl,--cref", "-nostdlib"]);
        assert!(args.libs.is_empty());
        assert!(args.implicit_lib_deps.is_empty());
    }

    #[rstest]
    fn search_paths_deduplicate_in_order() {
        let json = r#"{
            "name": "app.elf", "id": "app::@1", "type": "EXECUTABLE",
            "link": {"commandFragments": [
                {"fragment": "-L/sdk/ld", "role": "libraries"},
                {"fragment": "-L/sdk/lib", "role": "libraries"},
                {"fragment": "-L/sdk/ld", "role": "libraries"}
            ]}
        }"#;
        let target: TargetConfig = serde_json::from_str(json).expect("target");
        let args = extract_link_args(&target);
        assert_eq!(
            args.libpaths,
            vec![Utf8PathBuf::from("/sdk/ld"), Utf8PathBuf::from("/sdk/lib")]
        );
    }
}
