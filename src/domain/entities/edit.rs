use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub row_idx: usize,
    pub column: String,
}

/// Cells changed in the staging grid, mapped to the value parsed from the file.
#[derive(Debug, Clone, Default)]
pub struct StagedEdits {
    pub original_values: HashMap<CellKey, String>,
}

impl StagedEdits {
    /// Records an edit. Editing a cell back to its parsed value forgets it.
    pub fn record(&mut self, key: CellKey, previous: &str, value: &str) {
        match self.original_values.get(&key) {
            Some(original) if original == value => {
                self.original_values.remove(&key);
            }
            Some(_) => {}
            None if previous != value => {
                self.original_values.insert(key, previous.to_string());
            }
            None => {}
        }
    }

    pub fn is_edited(&self, row_idx: usize, column: &str) -> bool {
        self.original_values.contains_key(&CellKey {
            row_idx,
            column: column.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.original_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original_values.is_empty()
    }

    pub fn clear(&mut self) {
        self.original_values.clear();
    }
}
