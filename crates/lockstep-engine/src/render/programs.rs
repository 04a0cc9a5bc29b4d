//! Named GPU program library.
//!
//! Programs are WGSL modules looked up by name. Procedural programs are
//! registered as a fragment body and joined with the shared prelude (uniform
//! layout, full-screen vertex stage, noise helpers) at registration time, so
//! the render stage only ever sees complete sources.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProgramError;

pub const MESH_PROGRAM: &str = "mesh";
pub const BLIT_PROGRAM: &str = "blit";
/// Substituted when a requested procedural program is not registered.
pub const ERROR_PROGRAM: &str = "demo_error";

const PRELUDE: &str = include_str!("shaders/prelude.wgsl");

const BUILTIN_DEMOS: &[(&str, &str)] = &[
    (ERROR_PROGRAM, include_str!("shaders/demo_error.wgsl")),
    ("demo_bubbles", include_str!("shaders/demo_bubbles.wgsl")),
    ("demo_neon", include_str!("shaders/demo_neon.wgsl")),
    ("demo_fractal", include_str!("shaders/demo_fractal.wgsl")),
];

/// A program picked for a procedural scene.
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    pub name: String,
    pub source: Arc<str>,
    /// `true` when the requested name was missing and the error program
    /// was substituted.
    pub fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramTable {
    programs: HashMap<String, Arc<str>>,
}

impl ProgramTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every built-in program.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register(MESH_PROGRAM, include_str!("shaders/mesh.wgsl"));
        table.register(BLIT_PROGRAM, include_str!("shaders/blit.wgsl"));
        for (name, body) in BUILTIN_DEMOS {
            table.register_demo(name, body);
        }
        table
    }

    /// Registers a complete WGSL module under `name`, replacing any previous one.
    pub fn register(&mut self, name: &str, source: &str) {
        self.programs.insert(name.to_string(), Arc::from(source));
    }

    /// Registers a procedural fragment body, prefixed with the shared prelude.
    pub fn register_demo(&mut self, name: &str, body: &str) {
        let source = format!("{PRELUDE}\n{body}");
        self.programs.insert(name.to_string(), Arc::from(source));
    }

    pub fn get(&self, name: &str) -> Option<Arc<str>> {
        self.programs.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Sorted program names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.programs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Looks up a program the pipeline cannot run without.
    pub fn require(&self, name: &str) -> Result<Arc<str>, ProgramError> {
        self.get(name)
            .ok_or_else(|| ProgramError::LibraryUnavailable(name.to_string()))
    }

    /// Fails unless the mesh, blit and error programs are all present.
    pub fn require_core(&self) -> Result<(), ProgramError> {
        for name in [MESH_PROGRAM, BLIT_PROGRAM, ERROR_PROGRAM] {
            self.require(name)?;
        }
        Ok(())
    }

    /// Resolves a procedural program, substituting [`ERROR_PROGRAM`] when
    /// `name` is unknown.
    pub fn resolve_demo(&self, name: &str) -> Result<ResolvedProgram, ProgramError> {
        if let Some(source) = self.get(name) {
            return Ok(ResolvedProgram {
                name: name.to_string(),
                source,
                fallback: false,
            });
        }

        log::warn!("program '{name}' not found; using '{ERROR_PROGRAM}'");
        Ok(ResolvedProgram {
            name: ERROR_PROGRAM.to_string(),
            source: self.require(ERROR_PROGRAM)?,
            fallback: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_has_core_programs() {
        let table = ProgramTable::builtin();
        assert!(table.require_core().is_ok());
        assert_eq!(
            table.names(),
            vec!["blit", "demo_bubbles", "demo_error", "demo_fractal", "demo_neon", "mesh"]
        );
    }

    #[test]
    fn demos_are_joined_with_prelude() {
        let table = ProgramTable::builtin();
        let neon = table.get("demo_neon").unwrap();
        assert!(neon.contains("struct DemoUniforms"));
        assert!(neon.contains("fn vs_main"));
        assert!(neon.contains("fn fs_main"));

        let mesh = table.get(MESH_PROGRAM).unwrap();
        assert!(!mesh.contains("struct DemoUniforms"));
    }

    #[test]
    fn unknown_demo_falls_back_to_error_program() {
        let table = ProgramTable::builtin();
        let resolved = table.resolve_demo("demo_xyz").unwrap();
        assert!(resolved.fallback);
        assert_eq!(resolved.name, ERROR_PROGRAM);
    }

    #[test]
    fn known_demo_resolves_directly() {
        let table = ProgramTable::builtin();
        let resolved = table.resolve_demo("demo_fractal").unwrap();
        assert!(!resolved.fallback);
        assert_eq!(resolved.name, "demo_fractal");
    }

    #[test]
    fn empty_table_is_unavailable() {
        let table = ProgramTable::new();
        assert!(matches!(
            table.require_core(),
            Err(ProgramError::LibraryUnavailable(_))
        ));
        assert!(table.resolve_demo("demo_neon").is_err());
    }
}
