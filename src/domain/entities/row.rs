use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::domain::entities::columns::ColumnSet;

/// One staged spreadsheet row: column name to cell text, kept in column order.
///
/// Cells are never absent once a row has been projected onto a [`ColumnSet`];
/// an empty cell is stored as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRow {
    fields: Vec<(String, String)>,
}

impl ImportRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from `(column, value)` pairs. A repeated column keeps its
    /// first position and takes the last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut row = Self::new();
        for (column, value) in pairs {
            let column = column.into();
            row.set(&column, value);
        }
        row
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Cell text for `column`, `""` when the column is unknown.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    /// Sets a cell, appending the column when it is new. Returns the previous value.
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == column) {
            Some((_, current)) => Some(std::mem::replace(current, value)),
            None => {
                self.fields.push((column.to_string(), value));
                None
            }
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, value)| value.trim().is_empty())
    }

    /// Re-keys the row onto `columns`: same order, missing cells become `""`,
    /// cells outside the column set are dropped.
    pub fn project(&self, columns: &ColumnSet) -> ImportRow {
        ImportRow {
            fields: columns
                .iter()
                .map(|name| (name.to_string(), self.value(name).to_string()))
                .collect(),
        }
    }

    /// Case-insensitive substring match over every cell. `needle` must already be lowercase.
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        self.fields
            .iter()
            .any(|(_, value)| value.to_lowercase().contains(needle))
    }
}

impl Serialize for ImportRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_column_order() {
        let row = ImportRow::from_pairs([("zeta", "1"), ("alpha", "2"), ("mid", "")]);

        let json = serde_json::to_string(&row).expect("row should serialize");

        assert_eq!(json, r#"{"zeta":"1","alpha":"2","mid":""}"#);
    }

    #[test]
    fn project_fills_missing_cells_with_empty_string() {
        let row = ImportRow::from_pairs([("description", "Base"), ("height", "720")]);
        let columns = ColumnSet::new(
            vec!["code".to_string(), "description".to_string()],
            vec!["height".to_string()],
        );

        let projected = row.project(&columns);

        assert_eq!(
            projected.columns().collect::<Vec<_>>(),
            vec!["code", "description", "height"]
        );
        assert_eq!(projected.get("code"), Some(""));
        assert_eq!(projected.value("height"), "720");
    }

    #[test]
    fn set_returns_previous_value_and_keeps_position() {
        let mut row = ImportRow::from_pairs([("code", "A"), ("description", "d")]);

        let previous = row.set("code", "B");

        assert_eq!(previous.as_deref(), Some("A"));
        assert_eq!(row.columns().next(), Some("code"));
        assert_eq!(row.value("code"), "B");
    }
}
