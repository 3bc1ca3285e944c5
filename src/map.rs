// Mapping collaborator - markers and info popups

use crate::geocode::Coordinate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarkerKind {
    /// Palais des Festivals (blue)
    Landmark,
    /// Agency office (green)
    Agency,
    /// Searched apartment (red, labeled with its reference)
    Apartment,
}

impl MarkerKind {
    /// Legend entry
    pub fn legend(&self) -> &str {
        match self {
            MarkerKind::Landmark => "Palais des Festivals",
            MarkerKind::Agency => "Agence Born To Host",
            MarkerKind::Apartment => "Appartements Born To Host",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub label: String,
    pub position: Coordinate,
    /// Popup content opened on click
    pub info: String,
    pub kind: MarkerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerId(pub u64);

/// Anything that can display markers.
pub trait MapSurface: Send {
    fn place_marker(&mut self, marker: Marker) -> MarkerId;

    /// Unknown ids are ignored
    fn remove_marker(&mut self, id: MarkerId);

    /// Open the info popup of a marker, closing any other
    fn open_info(&mut self, id: MarkerId);
}

/// In-memory marker collection, rendered by the terminal front end.
#[derive(Debug, Default)]
pub struct MarkerBoard {
    markers: Vec<(MarkerId, Marker)>,
    next_id: u64,
    open: Option<MarkerId>,
}

impl MarkerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markers in placement order
    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter().map(|(_, m)| m)
    }

    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|(mid, _)| *mid == id).map(|(_, m)| m)
    }

    pub fn count(&self, kind: MarkerKind) -> usize {
        self.markers().filter(|m| m.kind == kind).count()
    }

    pub fn open_marker(&self) -> Option<&Marker> {
        self.open.and_then(|id| self.get(id))
    }
}

impl MapSurface for MarkerBoard {
    fn place_marker(&mut self, marker: Marker) -> MarkerId {
        self.next_id += 1;
        let id = MarkerId(self.next_id);
        self.markers.push((id, marker));
        id
    }

    fn remove_marker(&mut self, id: MarkerId) {
        self.markers.retain(|(mid, _)| *mid != id);
        if self.open == Some(id) {
            self.open = None;
        }
    }

    fn open_info(&mut self, id: MarkerId) {
        if self.get(id).is_some() {
            self.open = Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(label: &str, kind: MarkerKind) -> Marker {
        Marker {
            label: label.to_string(),
            position: Coordinate::new(43.55, 7.01),
            info: format!("{} info", label),
            kind,
        }
    }

    #[test]
    fn test_place_and_remove() {
        let mut board = MarkerBoard::new();
        let a = board.place_marker(marker("A1B1", MarkerKind::Apartment));
        let b = board.place_marker(marker("Palais", MarkerKind::Landmark));
        assert_ne!(a, b);
        assert_eq!(board.count(MarkerKind::Apartment), 1);

        board.remove_marker(a);
        assert_eq!(board.count(MarkerKind::Apartment), 0);
        assert_eq!(board.count(MarkerKind::Landmark), 1);

        // Removing twice is harmless
        board.remove_marker(a);
        assert_eq!(board.markers().count(), 1);
    }

    #[test]
    fn test_open_info_closes_with_marker() {
        let mut board = MarkerBoard::new();
        let a = board.place_marker(marker("A1B1", MarkerKind::Apartment));
        board.open_info(a);
        assert_eq!(board.open_marker().map(|m| m.info.as_str()), Some("A1B1 info"));

        board.remove_marker(a);
        assert!(board.open_marker().is_none());

        board.open_info(MarkerId(999));
        assert!(board.open_marker().is_none());
    }
}
