//! Map layouts drawn as text.

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::error::{GameError, Result};
use crate::navmesh::GroundSource;

/// A map drawn as rows of characters, top row first.
///
/// `.` is ground, `#` is ground blocked by a static obstacle, and a space is
/// void (no ground). `origin` is the world tile of the bottom-left character.
///
/// # Example RON
///
/// ```ron
/// MapData(
///     name: "corridor",
///     rows: [
///         ".....",
///         ".##..",
///         ".....",
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapData {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Rows, top first.
    pub rows: Vec<String>,
    /// World tile of the bottom-left character.
    #[serde(default)]
    pub origin: (i32, i32),
}

impl MapData {
    /// Parse from RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        super::parse_ron("MapData", source)
    }

    /// Build a map from literal rows, top first.
    #[must_use]
    pub fn from_rows(rows: &[&str]) -> Self {
        Self {
            name: String::new(),
            rows: rows.iter().map(|r| (*r).to_owned()).collect(),
            origin: (0, 0),
        }
    }

    /// Convert to terrain in world-tile coordinates.
    pub fn to_ground_source(&self) -> Result<GroundSource> {
        let mut source = GroundSource::default();
        let height = self.rows.len() as i32;

        for (row_index, row) in self.rows.iter().enumerate() {
            let y = height - 1 - row_index as i32 + self.origin.1;
            for (col, ch) in row.chars().enumerate() {
                let tile = Cell::new(col as i32 + self.origin.0, y);
                match ch {
                    '.' => {
                        source.ground.insert(tile);
                    }
                    '#' => {
                        source.ground.insert(tile);
                        source.obstacles.insert(tile);
                    }
                    ' ' => {}
                    other => {
                        return Err(GameError::DataParseError {
                            path: format!("map '{}'", self.name),
                            message: format!("unexpected character '{other}' at row {row_index}, column {col}"),
                        });
                    }
                }
            }
        }

        if source.ground.is_empty() {
            return Err(GameError::DataParseError {
                path: format!("map '{}'", self.name),
                message: "map has no ground tiles".to_owned(),
            });
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_top_first() {
        let map = MapData::from_rows(&["#..", "..."]);
        let source = map.to_ground_source().unwrap();
        assert_eq!(source.ground.len(), 6);
        assert!(source.obstacles.contains(&Cell::new(0, 1)));
        assert!(!source.obstacles.contains(&Cell::new(0, 0)));
    }

    #[test]
    fn test_void_and_origin() {
        let mut map = MapData::from_rows(&[". ."]);
        map.origin = (5, -2);
        let source = map.to_ground_source().unwrap();
        assert!(source.ground.contains(&Cell::new(5, -2)));
        assert!(!source.ground.contains(&Cell::new(6, -2)));
        assert!(source.ground.contains(&Cell::new(7, -2)));
    }

    #[test]
    fn test_rejects_unknown_characters() {
        let map = MapData::from_rows(&["..x"]);
        assert!(matches!(
            map.to_ground_source(),
            Err(GameError::DataParseError { .. })
        ));
        assert!(MapData::from_rows(&["   "]).to_ground_source().is_err());
    }

    #[test]
    fn test_parse_ron() {
        let map = MapData::from_ron_str(r#"(name: "tiny", rows: ["..", ".#"])"#).unwrap();
        assert_eq!(map.name, "tiny");
        assert_eq!(map.origin, (0, 0));
        assert_eq!(map.to_ground_source().unwrap().obstacles.len(), 1);
    }
}
