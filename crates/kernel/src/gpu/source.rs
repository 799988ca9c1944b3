//! Kernel source loading and preprocessing.
//!
//! Sources are WGSL files that may pull in other files with
//! `#include "name.wgsl"`. Each file is included at most once per module.
//! Before compiling, the backend prepends work-group size constants and, for
//! element-generic modules, the `Elem` alias with its accessors.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::BackendError;
use crate::grid::ElementKind;

/// File names of every kernel source the backend compiles or includes.
pub const KERNEL_FILES: [&str; 4] = ["common.wgsl", "advect.wgsl", "fluid.wgsl", "project.wgsl"];

const EMBEDDED: [(&str, &str); 4] = [
    ("common.wgsl", include_str!("shaders/common.wgsl")),
    ("advect.wgsl", include_str!("shaders/advect.wgsl")),
    ("fluid.wgsl", include_str!("shaders/fluid.wgsl")),
    ("project.wgsl", include_str!("shaders/project.wgsl")),
];

/// A set of kernel source files keyed by file name.
#[derive(Debug, Clone)]
pub struct KernelSources {
    files: HashMap<String, String>,
    origin: Option<PathBuf>,
}

impl KernelSources {
    /// The sources compiled into the crate.
    pub fn embedded() -> Self {
        Self {
            files: EMBEDDED
                .iter()
                .map(|(name, src)| (name.to_string(), src.to_string()))
                .collect(),
            origin: None,
        }
    }

    /// Load every file in [`KERNEL_FILES`] from `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, BackendError> {
        let dir = dir.as_ref();
        let mut files = HashMap::new();
        for name in KERNEL_FILES {
            let path = dir.join(name);
            let src = std::fs::read_to_string(&path)
                .map_err(|source| BackendError::KernelSource { path: path.clone(), source })?;
            files.insert(name.to_string(), src);
        }
        tracing::debug!(dir = %dir.display(), "loaded kernel sources");
        Ok(Self {
            files,
            origin: Some(dir.to_path_buf()),
        })
    }

    /// Override one file, e.g. for tests.
    pub fn with_file(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.files.insert(name.into(), source.into());
        self
    }

    /// Directory the sources came from, `None` for the embedded set.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// `name` with every `#include` expanded.
    pub fn resolve(&self, name: &str) -> Result<String, BackendError> {
        let mut seen = HashSet::new();
        let mut out = String::new();
        self.expand(name, name, &mut seen, &mut out)?;
        Ok(out)
    }

    fn expand(
        &self,
        root: &str,
        name: &str,
        seen: &mut HashSet<String>,
        out: &mut String,
    ) -> Result<(), BackendError> {
        if !seen.insert(name.to_string()) {
            return Ok(());
        }
        let src = self.files.get(name).ok_or_else(|| BackendError::Compilation {
            kernel: root.to_string(),
            message: format!("missing kernel source `{name}`"),
        })?;
        for line in src.lines() {
            match parse_include(line) {
                Some(target) => self.expand(root, target, seen, out)?,
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        Ok(())
    }
}

fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?;
    rest.trim().strip_prefix('"')?.strip_suffix('"')
}

/// Module-scope constants for the work-group size.
pub fn workgroup_prelude(local: [u32; 3]) -> String {
    format!(
        "const WG_X: u32 = {}u;\nconst WG_Y: u32 = {}u;\nconst WG_Z: u32 = {}u;\n",
        local[0], local[1], local[2]
    )
}

/// `Elem` alias plus typed accessors for the generic slots of an
/// element-generic module.
pub fn element_prelude(kind: ElementKind) -> String {
    let n = kind.channels();
    let ty = format!("vec{n}<f32>");
    let mut s = format!("alias Elem = {ty};\nconst ELEM_CHANNELS: u32 = {n}u;\n");

    for slot in ["b", "c", "out"] {
        let comps = (0..n)
            .map(|k| format!("slot_{slot}[i * {n}u + {k}u]"))
            .collect::<Vec<_>>()
            .join(", ");
        s.push_str(&format!("fn load_elem_{slot}(i: u32) -> {ty} {{\n    return {ty}({comps});\n}}\n"));
    }

    s.push_str(&format!("fn store_elem_out(i: u32, v: {ty}) {{\n"));
    for (k, c) in ["x", "y", "z"].iter().take(n).enumerate() {
        s.push_str(&format!("    slot_out[i * {n}u + {k}u] = v.{c};\n"));
    }
    s.push_str("}\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_expand_once() {
        let sources = KernelSources::embedded()
            .with_file("a.wgsl", "#include \"b.wgsl\"\n#include \"b.wgsl\"\nfn a() {}\n")
            .with_file("b.wgsl", "fn b() {}\n");
        let src = sources.resolve("a.wgsl").unwrap();
        assert_eq!(src.matches("fn b()").count(), 1);
        assert!(src.contains("fn a()"));
    }

    #[test]
    fn missing_include_is_a_compilation_error() {
        let sources = KernelSources::embedded().with_file("a.wgsl", "#include \"nope.wgsl\"\n");
        let err = sources.resolve("a.wgsl").unwrap_err();
        assert!(matches!(err, BackendError::Compilation { .. }), "{err}");
    }

    #[test]
    fn embedded_kernels_pull_in_common_bindings() {
        let src = KernelSources::embedded().resolve("advect.wgsl").unwrap();
        assert!(src.contains("var<uniform> args"));
        assert!(!src.contains("#include"));
    }

    #[test]
    fn element_prelude_matches_channel_count() {
        let p = element_prelude(ElementKind::FluidState);
        assert!(p.contains("alias Elem = vec2<f32>;"));
        assert!(p.contains("slot_out[i * 2u + 1u] = v.y;"));
        assert!(!p.contains("v.z"));
    }

    #[test]
    fn missing_directory_reports_path() {
        let err = KernelSources::from_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, BackendError::KernelSource { .. }));
    }
}
