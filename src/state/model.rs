#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    Active,
}

impl SelectionState {
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}
