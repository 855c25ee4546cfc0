use super::model::SelectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEvent {
    Start,
    Hover,
    Click,
    Stop,
    ShortcutToggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: Option<SelectionState>,
    pub event: SelectionEvent,
    pub to: SelectionState,
}

impl StateTransition {
    pub const fn new(from: Option<SelectionState>, event: SelectionEvent, to: SelectionState) -> Self {
        Self { from, event, to }
    }
}
