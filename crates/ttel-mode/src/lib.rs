//! Global mode state: a small stack with one base entry plus any number of
//! `ExcludedExecution` modifiers, and a cached OR'd effective mode.
//!
//! Modeled the way `core-state`'s `Mode`/`OverlayMode` pair represents a
//! base editing mode plus an independently toggleable overlay: keep the
//! base and the modifier as separate concepts instead of one flat enum of
//! every combination, and recompute the derived value on every mutation
//! rather than letting it drift out of sync.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseMode {
    /// Attached but not yet recording; object tagging is still active.
    Pending,
    Detached,
    RecordEnabled,
    DebuggingEnabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeToken {
    Base(BaseMode),
    ExcludedExecution,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("pop_excluded_execution called with no excluded-execution marker on the stack")]
    StackUnderflow,
}

/// The OR-folded view of the mode stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveMode {
    pub base: BaseMode,
    pub excluded_execution: bool,
}

pub struct ModeMachine {
    stack: Vec<ModeToken>,
    cached: EffectiveMode,
}

impl ModeMachine {
    pub fn new(initial: BaseMode) -> Self {
        let stack = vec![ModeToken::Base(initial)];
        let cached = EffectiveMode {
            base: initial,
            excluded_execution: false,
        };
        tracing::info!(target: "ttel.mode", base = ?initial, "mode machine initialized");
        Self { stack, cached }
    }

    pub fn effective(&self) -> EffectiveMode {
        self.cached
    }

    /// Replaces the base mode at the bottom of the stack, leaving any
    /// `ExcludedExecution` markers untouched.
    pub fn set_base(&mut self, base: BaseMode) {
        self.stack[0] = ModeToken::Base(base);
        self.recompute();
        tracing::info!(target: "ttel.mode", new_base = ?base, "base mode transition");
    }

    pub fn push_excluded_execution(&mut self) {
        self.stack.push(ModeToken::ExcludedExecution);
        self.recompute();
        tracing::trace!(target: "ttel.mode", depth = self.stack.len(), "push excluded execution");
    }

    pub fn pop_excluded_execution(&mut self) -> Result<(), ModeError> {
        match self.stack.last() {
            Some(ModeToken::ExcludedExecution) => {
                self.stack.pop();
                self.recompute();
                tracing::trace!(target: "ttel.mode", depth = self.stack.len(), "pop excluded execution");
                Ok(())
            }
            _ => Err(ModeError::StackUnderflow),
        }
    }

    fn recompute(&mut self) {
        let base = self
            .stack
            .iter()
            .find_map(|t| match t {
                ModeToken::Base(b) => Some(*b),
                ModeToken::ExcludedExecution => None,
            })
            .expect("index 0 is always a base token");
        let excluded_execution = self
            .stack
            .iter()
            .any(|t| matches!(t, ModeToken::ExcludedExecution));
        self.cached = EffectiveMode {
            base,
            excluded_execution,
        };
    }

    pub fn should_record(&self) -> bool {
        self.cached.base == BaseMode::RecordEnabled && !self.cached.excluded_execution
    }

    pub fn should_replay(&self) -> bool {
        self.cached.base == BaseMode::DebuggingEnabled && !self.cached.excluded_execution
    }

    pub fn should_tag_jsrt(&self) -> bool {
        matches!(self.cached.base, BaseMode::Pending | BaseMode::RecordEnabled)
            && !self.cached.excluded_execution
    }

    pub fn should_tag_external(&self) -> bool {
        matches!(
            self.cached.base,
            BaseMode::Pending | BaseMode::RecordEnabled | BaseMode::DebuggingEnabled
        ) && !self.cached.excluded_execution
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.cached.base,
            BaseMode::RecordEnabled | BaseMode::DebuggingEnabled
        )
    }

    pub fn is_detached(&self) -> bool {
        self.cached.base == BaseMode::Detached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_execution_suppresses_record_without_changing_base() {
        let mut m = ModeMachine::new(BaseMode::Pending);
        m.set_base(BaseMode::RecordEnabled);
        assert!(m.should_record());
        m.push_excluded_execution();
        assert!(!m.should_record());
        assert_eq!(m.effective().base, BaseMode::RecordEnabled);
        m.pop_excluded_execution().unwrap();
        assert!(m.should_record());
    }

    #[test]
    fn pop_without_push_is_an_error() {
        let mut m = ModeMachine::new(BaseMode::Pending);
        assert_eq!(m.pop_excluded_execution(), Err(ModeError::StackUnderflow));
    }

    #[test]
    fn should_tag_external_covers_pending_record_and_debugging() {
        let mut m = ModeMachine::new(BaseMode::Pending);
        assert!(m.should_tag_external());
        m.set_base(BaseMode::RecordEnabled);
        assert!(m.should_tag_external());
        m.set_base(BaseMode::DebuggingEnabled);
        assert!(m.should_tag_external());
        m.set_base(BaseMode::Detached);
        assert!(!m.should_tag_external());
    }

    #[test]
    fn detached_is_not_active() {
        let m = ModeMachine::new(BaseMode::Detached);
        assert!(!m.is_active());
        assert!(m.is_detached());
    }
}
