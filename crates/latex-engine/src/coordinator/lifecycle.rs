//! Per-request state machine
//!
//! ```text
//! Queued -> Rendering -> Compiling -> Interpreting -> Finalizing -> Completed
//!    \           \            \             \              \-----> Failed
//!     \-----------\------------\-------------\--> Finalizing (on failure)
//! ```

use std::fmt;

use serde::Serialize;

use crate::compiler::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilationState {
    Queued,
    Rendering,
    Compiling,
    Interpreting,
    Finalizing,
    Completed,
    Failed,
}

impl CompilationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CompilationState::Completed | CompilationState::Failed)
    }

    /// Transitions of the normal path plus the failure jump to `Finalizing`
    pub fn can_transition_to(self, next: CompilationState) -> bool {
        use CompilationState::*;
        match (self, next) {
            (Queued, Rendering)
            | (Rendering, Compiling)
            | (Compiling, Interpreting)
            | (Interpreting, Finalizing)
            | (Finalizing, Completed)
            | (Finalizing, Failed) => true,
            (Queued | Rendering | Compiling, Finalizing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CompilationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompilationState::Queued => "queued",
            CompilationState::Rendering => "rendering",
            CompilationState::Compiling => "compiling",
            CompilationState::Interpreting => "interpreting",
            CompilationState::Finalizing => "finalizing",
            CompilationState::Completed => "completed",
            CompilationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current state and every state visited so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lifecycle {
    state: CompilationState,
    history: Vec<CompilationState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: CompilationState::Queued,
            history: vec![CompilationState::Queued],
        }
    }

    pub fn state(&self) -> CompilationState {
        self.state
    }

    pub fn history(&self) -> &[CompilationState] {
        &self.history
    }

    /// Whether the request ever entered `state`
    pub fn visited(&self, state: CompilationState) -> bool {
        self.history.contains(&state)
    }

    pub fn advance(&mut self, next: CompilationState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::Internal(format!(
                "invalid state transition {} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Enter `Finalizing` from wherever the request stopped
    pub fn finalize(&mut self) {
        if self.state != CompilationState::Finalizing && !self.state.is_terminal() {
            self.state = CompilationState::Finalizing;
            self.history.push(CompilationState::Finalizing);
        }
    }

    /// Leave `Finalizing` for the terminal state matching the result
    pub fn finish(&mut self, success: bool) -> CompilationState {
        self.finalize();
        if !self.state.is_terminal() {
            let terminal = if success {
                CompilationState::Completed
            } else {
                CompilationState::Failed
            };
            self.state = terminal;
            self.history.push(terminal);
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CompilationState::*;

    #[test]
    fn test_happy_path() {
        let mut lifecycle = Lifecycle::new();
        for next in [Rendering, Compiling, Interpreting, Finalizing] {
            lifecycle.advance(next).unwrap();
        }
        assert_eq!(lifecycle.finish(true), Completed);
        assert_eq!(
            lifecycle.history(),
            &[Queued, Rendering, Compiling, Interpreting, Finalizing, Completed]
        );
    }

    #[test]
    fn test_failure_jumps_to_finalizing() {
        for stop in [Queued, Rendering, Compiling, Interpreting] {
            let mut lifecycle = Lifecycle::new();
            for next in [Rendering, Compiling, Interpreting] {
                if lifecycle.state() == stop {
                    break;
                }
                lifecycle.advance(next).unwrap();
            }

            assert_eq!(lifecycle.finish(false), Failed);
            assert!(lifecycle.visited(Finalizing), "no cleanup after {}", stop);
            assert_eq!(lifecycle.history().last(), Some(&Failed));
        }
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.advance(Compiling).is_err());
        assert!(lifecycle.advance(Completed).is_err());
        assert_eq!(lifecycle.state(), Queued);

        lifecycle.advance(Rendering).unwrap();
        assert!(lifecycle.advance(Rendering).is_err());
        assert!(lifecycle.advance(Queued).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.finish(false), Failed);
        assert_eq!(lifecycle.finish(true), Failed);
        assert!(lifecycle.advance(Rendering).is_err());

        for terminal in [Completed, Failed] {
            for next in [Queued, Rendering, Compiling, Interpreting, Finalizing, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_finalizing_recorded_once() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.finalize();
        lifecycle.finalize();
        lifecycle.finish(false);
        let count = lifecycle.history().iter().filter(|s| **s == Finalizing).count();
        assert_eq!(count, 1);
    }
}
