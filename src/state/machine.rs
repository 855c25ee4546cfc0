use super::error::{StateError, StateResult};
use super::{event::StateTransition, SelectionEvent, SelectionState};

const HISTORY_LIMIT: usize = 64;

#[derive(Debug)]
pub struct StateMachine {
    state: SelectionState,
    transition_history: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SelectionState::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn can_transition(&self, event: SelectionEvent) -> bool {
        self.next_state(event).is_some()
    }

    pub fn next_state(&self, event: SelectionEvent) -> Option<SelectionState> {
        use SelectionEvent::*;
        match (self.state, event) {
            (SelectionState::Idle, Start) => Some(SelectionState::Active),
            (SelectionState::Active, Hover) => Some(SelectionState::Active),
            (SelectionState::Active, Click) => Some(SelectionState::Idle),
            (SelectionState::Active, Stop) => Some(SelectionState::Idle),
            (SelectionState::Active, ShortcutToggle) => Some(SelectionState::Idle),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: SelectionEvent) -> StateResult<SelectionState> {
        tracing::debug!(from = ?self.state, event = ?event, "request selection transition");
        let next = self.next_state(event).ok_or_else(|| {
            let from = self.state;
            tracing::warn!(from = ?from, event = ?event, "invalid selection transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        let record = StateTransition::new(Some(self.state), event, next);
        self.state = next;
        if self.transition_history.len() == HISTORY_LIMIT {
            self.transition_history.remove(0);
        }
        self.transition_history.push(record);

        Ok(self.state)
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.transition_history
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SelectionState::{:?}", self.state)
    }
}
