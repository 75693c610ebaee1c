// Address history for the active view.
//
// State changes derive an address and push it only when it differs from the
// current entry. Back/forward move the cursor without pushing; the caller
// then derives state from the address at the cursor.

#[derive(Debug, Clone, Default)]
pub struct Navigator {
    entries: Vec<String>,
    cursor: usize,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Push `address` unless it is already current. Anything ahead of the
    /// cursor is dropped. Returns whether a new entry was pushed.
    pub fn record(&mut self, address: String) -> bool {
        if self.current() == Some(address.as_str()) {
            return false;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(address);
        self.cursor = self.entries.len() - 1;
        true
    }

    pub fn back(&mut self) -> Option<&str> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.current()
    }

    pub fn forward(&mut self) -> Option<&str> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        self.current()
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
