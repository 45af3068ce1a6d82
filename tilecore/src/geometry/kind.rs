//! Geometry kind classification tags.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Category of renderable content within a tile.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometryKind {
    /// Content with no more specific category.
    All,
    Terrain,
    Background,
    Area,
    Line,
    Building,
    Road,
    Border,
    Label,
    Detail,
    BaseMap,
    /// Data-defined tag.
    Custom(Arc<str>),
}

impl GeometryKind {
    /// Tag name as used in style data and configuration.
    pub fn as_str(&self) -> &str {
        match self {
            GeometryKind::All => "all",
            GeometryKind::Terrain => "terrain",
            GeometryKind::Background => "background",
            GeometryKind::Area => "area",
            GeometryKind::Line => "line",
            GeometryKind::Building => "building",
            GeometryKind::Road => "road",
            GeometryKind::Border => "border",
            GeometryKind::Label => "label",
            GeometryKind::Detail => "detail",
            GeometryKind::BaseMap => "basemap",
            GeometryKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryKind {
    type Err = std::convert::Infallible;

    /// Known names map to their variant; anything else becomes `Custom`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_lowercase().as_str() {
            "all" => GeometryKind::All,
            "terrain" => GeometryKind::Terrain,
            "background" => GeometryKind::Background,
            "area" => GeometryKind::Area,
            "line" => GeometryKind::Line,
            "building" => GeometryKind::Building,
            "road" => GeometryKind::Road,
            "border" => GeometryKind::Border,
            "label" => GeometryKind::Label,
            "detail" => GeometryKind::Detail,
            "basemap" => GeometryKind::BaseMap,
            _ => GeometryKind::Custom(Arc::from(s.trim())),
        };
        Ok(kind)
    }
}

/// Set of geometry kinds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryKindSet {
    kinds: BTreeSet<GeometryKind>,
}

impl GeometryKindSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: GeometryKind) -> bool {
        self.kinds.insert(kind)
    }

    pub fn contains(&self, kind: &GeometryKind) -> bool {
        self.kinds.contains(kind)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// True if every kind in `self` is also in `other`.
    pub fn is_subset(&self, other: &GeometryKindSet) -> bool {
        self.kinds.is_subset(&other.kinds)
    }

    /// True if the sets share at least one kind.
    pub fn intersects(&self, other: &GeometryKindSet) -> bool {
        !self.kinds.is_disjoint(&other.kinds)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeometryKind> {
        self.kinds.iter()
    }

    /// Parse a comma-separated list such as `"area, line, building"`.
    pub fn parse_list(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

impl FromIterator<GeometryKind> for GeometryKindSet {
    fn from_iter<I: IntoIterator<Item = GeometryKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[GeometryKind; N]> for GeometryKindSet {
    fn from(kinds: [GeometryKind; N]) -> Self {
        kinds.into_iter().collect()
    }
}

impl fmt::Display for GeometryKindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in &self.kinds {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", kind)?;
            first = false;
        }
        Ok(())
    }
}

/// An enabled or disabled kind filter.
///
/// Filters are shared immutably, so a filter handed to a loader can never be
/// changed behind its back; callers replace a filter rather than mutating it.
pub type KindFilter = Option<Arc<GeometryKindSet>>;

/// Whether a filter pair admits content of `kind`.
///
/// An item is produced unless its kind is disabled, or an enabled set is
/// given that does not contain it. `All` content passes any enabled set.
pub fn filter_admits(enabled: &KindFilter, disabled: &KindFilter, kind: &GeometryKind) -> bool {
    if disabled.as_ref().is_some_and(|set| set.contains(kind)) {
        return false;
    }
    match enabled.as_ref() {
        Some(set) if !set.is_empty() => *kind == GeometryKind::All || set.contains(kind),
        _ => true,
    }
}

fn is_empty_filter(filter: &KindFilter) -> bool {
    filter.as_ref().map_or(true, |set| set.is_empty())
}

fn filter_equal(a: &KindFilter, b: &KindFilter) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if Arc::ptr_eq(a, b) => true,
        _ if is_empty_filter(a) && is_empty_filter(b) => true,
        (Some(a), Some(b)) => a.is_subset(b) && b.is_subset(a),
        _ => false,
    }
}

/// Compare the filters last used for a tile against newly requested ones.
///
/// Used only to decide whether built geometry must be discarded:
/// identical references are equal, absent and empty sets are
/// interchangeable, and non-empty sets are compared by mutual containment.
pub fn kind_filters_equal(
    old_enabled: &KindFilter,
    old_disabled: &KindFilter,
    new_enabled: &KindFilter,
    new_disabled: &KindFilter,
) -> bool {
    filter_equal(old_enabled, new_enabled) && filter_equal(old_disabled, new_disabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(kinds: &[GeometryKind]) -> KindFilter {
        Some(Arc::new(kinds.iter().cloned().collect()))
    }

    #[test]
    fn test_parse_known_and_custom_kinds() {
        assert_eq!("Building".parse::<GeometryKind>().unwrap(), GeometryKind::Building);
        assert_eq!(
            "water-bodies".parse::<GeometryKind>().unwrap(),
            GeometryKind::Custom(Arc::from("water-bodies"))
        );
    }

    #[test]
    fn test_parse_list() {
        let set = GeometryKindSet::parse_list("area, line,,building");
        assert_eq!(set.len(), 3);
        assert!(set.contains(&GeometryKind::Line));
        assert_eq!(set.to_string(), "area,line,building");
    }

    #[test]
    fn test_same_reference_is_equal() {
        let enabled = filter(&[GeometryKind::Building]);
        assert!(kind_filters_equal(&enabled, &None, &enabled.clone(), &None));
    }

    #[test]
    fn test_absent_and_empty_are_equal() {
        let empty: KindFilter = Some(Arc::new(GeometryKindSet::new()));
        assert!(kind_filters_equal(&None, &None, &None, &None));
        assert!(kind_filters_equal(&empty, &None, &None, &empty));
    }

    #[test]
    fn test_equal_contents_are_equal() {
        let a = filter(&[GeometryKind::Area, GeometryKind::Line]);
        let b = filter(&[GeometryKind::Line, GeometryKind::Area]);
        assert!(kind_filters_equal(&a, &None, &b, &None));
    }

    #[test]
    fn test_any_difference_requires_reset() {
        let building = filter(&[GeometryKind::Building]);
        let more = filter(&[GeometryKind::Building, GeometryKind::Label]);

        assert!(!kind_filters_equal(&building, &None, &None, &building));
        assert!(!kind_filters_equal(&building, &None, &more, &None));
        assert!(!kind_filters_equal(&None, &None, &None, &building));
    }

    #[test]
    fn test_filter_admits() {
        let enabled = filter(&[GeometryKind::Area]);
        let disabled = filter(&[GeometryKind::Label]);

        assert!(filter_admits(&None, &None, &GeometryKind::Label));
        assert!(!filter_admits(&None, &disabled, &GeometryKind::Label));
        assert!(filter_admits(&enabled, &None, &GeometryKind::Area));
        assert!(!filter_admits(&enabled, &None, &GeometryKind::Line));
        assert!(filter_admits(&enabled, &None, &GeometryKind::All));
    }
}
