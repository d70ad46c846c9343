/// Linear undo/redo over immutable snapshots. The owner commits a snapshot
/// after every structural mutation (create or delete); continuous style
/// edits are deliberately not committed so a slider drag does not flood the
/// history.
#[derive(Clone, Debug)]
pub struct History<T: Clone> {
    states: Vec<T>,
    /// Index into `states`; meaningful only while `states` is non-empty.
    cursor: usize,
}

impl<T: Clone> History<T> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            cursor: 0,
        }
    }

    /// Append a snapshot, discarding any redo branch past the cursor.
    pub fn commit(&mut self, snapshot: T) {
        if !self.states.is_empty() {
            self.states.truncate(self.cursor + 1);
        }
        self.states.push(snapshot);
        self.cursor = self.states.len() - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.states.len()
    }

    /// Step back and return the snapshot now under the cursor; `None` when
    /// already at the oldest state.
    pub fn undo(&mut self) -> Option<&T> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(&self.states[self.cursor])
    }

    pub fn redo(&mut self) -> Option<&T> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(&self.states[self.cursor])
    }

    /// Drop everything and start over from `initial`.
    pub fn reset(&mut self, initial: T) {
        self.states.clear();
        self.states.push(initial);
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn current(&self) -> Option<&T> {
        self.states.get(self.cursor)
    }
}

impl<T: Clone> Default for History<T> {
    fn default() -> Self {
        Self::new()
    }
}
