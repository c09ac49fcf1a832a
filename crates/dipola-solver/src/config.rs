//! Solver configuration.

use crate::solvers::SolverKind;
use serde::{Deserialize, Serialize};

/// Configuration of an [`IterativeSolver`](crate::iterative::IterativeSolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Krylov method.
    pub kind: SolverKind,
    /// Iteration cap; `None` means unlimited.
    pub max_iter: Option<usize>,
    /// Override of the method's no-improvement limit.
    pub max_res_increase: Option<usize>,
    /// Write a self-overwriting progress line to stderr.
    pub progress: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::QmrCs,
            max_iter: None,
            max_res_increase: None,
            progress: false,
        }
    }
}

impl SolverConfig {
    /// Default configuration for `kind`.
    pub fn new(kind: SolverKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Set the Krylov method.
    pub fn with_kind(mut self, kind: SolverKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    /// Set the no-improvement limit.
    pub fn with_max_res_increase(mut self, limit: usize) -> Self {
        self.max_res_increase = Some(limit);
        self
    }

    /// Enable or disable the stderr progress line.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn effective_max_iter(&self) -> usize {
        self.max_iter.unwrap_or(usize::MAX)
    }

    pub fn effective_max_res_increase(&self) -> usize {
        self.max_res_increase
            .unwrap_or_else(|| self.kind.max_res_increase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let c = SolverConfig::new(SolverKind::Cgnr)
            .with_max_iter(40)
            .with_progress(true);
        assert_eq!(c.kind, SolverKind::Cgnr);
        assert_eq!(c.effective_max_iter(), 40);
        assert_eq!(c.effective_max_res_increase(), 10);
        assert!(c.progress);
        let c = c.with_max_res_increase(3).with_kind(SolverKind::BicgStab);
        assert_eq!(c.effective_max_res_increase(), 3);
    }

    #[test]
    fn test_json_defaults() {
        let c: SolverConfig = serde_json::from_str(r#"{"kind": "bicgcs"}"#).unwrap();
        assert_eq!(c.kind, SolverKind::BicgCs);
        assert_eq!(c.effective_max_iter(), usize::MAX);
        assert!(!c.progress);
        let back: SolverConfig = serde_json::from_str(&serde_json::to_string(&c).unwrap()).unwrap();
        assert_eq!(back, c);
    }
}
