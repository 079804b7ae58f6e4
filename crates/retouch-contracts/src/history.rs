/// Linear undo/redo history of edit results.
///
/// Entries are data URIs produced by successful edits. The cursor is `None` while the
/// original image is shown; otherwise it always points inside `entries`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditHistory {
    entries: Vec<String>,
    cursor: Option<usize>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from its persisted form. Returns `None` when `index` falls outside
    /// `-1..entries.len()`.
    pub fn from_parts(entries: Vec<String>, index: i64) -> Option<Self> {
        let cursor = match index {
            -1 => None,
            value if value >= 0 && (value as usize) < entries.len() => Some(value as usize),
            _ => return None,
        };
        Some(Self { entries, cursor })
    }

    /// Drops the redo tail, pushes `result` and selects it.
    pub fn append(&mut self, result: String) {
        let keep = self.cursor.map(|index| index + 1).unwrap_or(0);
        self.entries.truncate(keep);
        self.entries.push(result);
        self.cursor = Some(self.entries.len() - 1);
    }

    pub fn undo(&mut self) -> bool {
        match self.cursor {
            Some(0) => self.cursor = None,
            Some(index) => self.cursor = Some(index - 1),
            None => return false,
        }
        true
    }

    pub fn redo(&mut self) -> bool {
        let next = self.cursor.map(|index| index + 1).unwrap_or(0);
        if next >= self.entries.len() {
            return false;
        }
        self.cursor = Some(next);
        true
    }

    /// The selected edit result, or `None` when the original is shown.
    pub fn current(&self) -> Option<&str> {
        self.cursor
            .and_then(|index| self.entries.get(index))
            .map(String::as_str)
    }

    pub fn current_or<'a>(&'a self, original: &'a str) -> &'a str {
        self.current().unwrap_or(original)
    }

    /// Signed cursor where `-1` means "original".
    pub fn index(&self) -> i64 {
        self.cursor.map(|index| index as i64).unwrap_or(-1)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.index() < self.entries.len() as i64 - 1
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}
