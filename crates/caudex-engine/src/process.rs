//! The opaque process the engine drives.

use anyhow::Result;

/// A deterministic, event-driven state machine with serialization support.
///
/// Determinism is the contract the whole engine rests on: applying the same
/// events to the same serialized state must yield the same state and the
/// same responses, or replayed history diverges from what was live.
pub trait Process: Send {
    /// Applies one event and returns its response.
    fn apply_event(&mut self, event: &str) -> Result<String>;

    /// The current state in serialized form.
    fn serialized_state(&self) -> Result<String>;

    /// Replaces the current state with a previously serialized one.
    fn restore_state(&mut self, state: &str) -> Result<()>;

    /// Releases resources. Called once when the owning engine is disposed.
    fn dispose(&mut self) {}
}

/// Deterministic stub process: the state is the concatenation of every
/// applied event and the response echoes the event. Default state is the
/// empty string.
#[derive(Debug, Default, Clone)]
pub struct ConcatProcess {
    state: String,
}

impl ConcatProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &str {
        &self.state
    }
}

impl Process for ConcatProcess {
    fn apply_event(&mut self, event: &str) -> Result<String> {
        self.state.push_str(event);
        Ok(event.to_owned())
    }

    fn serialized_state(&self) -> Result<String> {
        Ok(self.state.clone())
    }

    fn restore_state(&mut self, state: &str) -> Result<()> {
        self.state = state.to_owned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_process_is_deterministic() {
        let mut first = ConcatProcess::new();
        let mut second = ConcatProcess::new();
        for event in ["a", "b", "c"] {
            assert_eq!(first.apply_event(event).unwrap(), event);
            second.apply_event(event).unwrap();
        }
        assert_eq!(
            first.serialized_state().unwrap(),
            second.serialized_state().unwrap()
        );
        assert_eq!(first.state(), "abc");
    }

    #[test]
    fn restore_replaces_state() {
        let mut process = ConcatProcess::new();
        process.apply_event("a").unwrap();
        process.restore_state("xyz").unwrap();
        assert_eq!(process.state(), "xyz");
        process.apply_event("!").unwrap();
        assert_eq!(process.state(), "xyz!");
    }
}
