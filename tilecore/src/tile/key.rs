//! Tile addressing.

use std::fmt;
use std::str::FromStr;

/// Address of a tile in the quadtree.
///
/// Rows increase southward and columns eastward; at `level` both range over
/// `0..2^level`.
///
/// # Example
///
/// ```
/// use tilecore::TileKey;
///
/// let key: TileKey = "14/5372/8800".parse().unwrap();
/// assert_eq!(key.level(), 14);
/// assert_eq!(key.row(), 5372);
/// assert_eq!(key.column(), 8800);
/// assert_eq!(key.to_string(), "14/5372/8800");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    row: u32,
    column: u32,
    level: u8,
}

impl TileKey {
    pub fn new(row: u32, column: u32, level: u8) -> Self {
        Self { row, column, level }
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// The tile one level up that contains this one, or `None` at level 0.
    pub fn parent(&self) -> Option<TileKey> {
        (self.level > 0).then(|| TileKey::new(self.row >> 1, self.column >> 1, self.level - 1))
    }

    /// The four tiles one level down, in row-major order.
    pub fn children(&self) -> [TileKey; 4] {
        let (row, column, level) = (self.row << 1, self.column << 1, self.level + 1);
        [
            TileKey::new(row, column, level),
            TileKey::new(row, column + 1, level),
            TileKey::new(row + 1, column, level),
            TileKey::new(row + 1, column + 1, level),
        ]
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.column)
    }
}

/// Error parsing a `level/row/column` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tile key '{0}', expected level/row/column")]
pub struct ParseTileKeyError(String);

impl FromStr for TileKey {
    type Err = ParseTileKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseTileKeyError(s.to_string());
        let mut parts = s.trim().split('/');
        let (Some(level), Some(row), Some(column), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let level: u8 = level.parse().map_err(|_| invalid())?;
        let row: u32 = row.parse().map_err(|_| invalid())?;
        let column: u32 = column.parse().map_err(|_| invalid())?;
        if level >= 32 || (row >> level) != 0 || (column >> level) != 0 {
            return Err(invalid());
        }
        Ok(TileKey::new(row, column, level))
    }
}
