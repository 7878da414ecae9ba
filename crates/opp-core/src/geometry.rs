//! Zone geometry: a single WGS84 polygon exchanged as GeoJSON.
//!
//! Coordinates are `[longitude, latitude]` pairs, matching GeoJSON. The
//! containment and overlap predicates come from the `geo` crate; this
//! module only validates input and adapts it to [`geo::Polygon`].

use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon, Rect, Relate};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{OppError, OppResult};

/// Minimum number of positions in a closed linear ring.
const MIN_RING_POSITIONS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ZoneGeometry {
    polygon: Polygon<f64>,
    bounds: Rect<f64>,
}

/// Axis-aligned extent of a zone, edges included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bounds {
    /// True when the two boxes share at least one point.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

impl ZoneGeometry {
    /// Build from an exterior ring and optional holes, each a closed list
    /// of `(lon, lat)` positions.
    pub fn from_rings(exterior: &[(f64, f64)], interiors: &[Vec<(f64, f64)>]) -> OppResult<Self> {
        let exterior = ring(exterior)?;
        let interiors = interiors
            .iter()
            .map(|r| ring(r))
            .collect::<OppResult<Vec<_>>>()?;
        let polygon = Polygon::new(exterior, interiors);
        let bounds = polygon
            .bounding_rect()
            .ok_or_else(|| OppError::invalid_input("polygon has no extent"))?;
        Ok(Self { polygon, bounds })
    }

    /// Parse a GeoJSON `Polygon` object.
    pub fn from_geojson(value: &Value) -> OppResult<Self> {
        let kind = value.get("type").and_then(Value::as_str);
        if kind != Some("Polygon") {
            return Err(OppError::invalid_input(
                "geometry must be a GeoJSON Polygon",
            ));
        }
        let rings = value
            .get("coordinates")
            .and_then(Value::as_array)
            .ok_or_else(|| OppError::invalid_input("geometry has no coordinates array"))?;
        let mut parsed = rings
            .iter()
            .map(positions)
            .collect::<OppResult<Vec<_>>>()?
            .into_iter();
        let exterior = parsed
            .next()
            .ok_or_else(|| OppError::invalid_input("polygon has no exterior ring"))?;
        let interiors: Vec<_> = parsed.collect();
        Self::from_rings(&exterior, &interiors)
    }

    /// Parse GeoJSON text, as sent by map clients.
    pub fn from_geojson_str(text: &str) -> OppResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| OppError::invalid_input(format!("geometry is not valid JSON: {e}")))?;
        Self::from_geojson(&value)
    }

    pub fn to_geojson(&self) -> Value {
        let mut rings = vec![ring_coordinates(self.polygon.exterior())];
        rings.extend(self.polygon.interiors().iter().map(ring_coordinates));
        json!({ "type": "Polygon", "coordinates": rings })
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn bounds(&self) -> Bounds {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        Bounds {
            min_lon: min.x,
            min_lat: min.y,
            max_lon: max.x,
            max_lat: max.y,
        }
    }

    /// Strict containment: a point on the boundary is not inside.
    pub fn contains_point(&self, longitude: f64, latitude: f64) -> bool {
        self.polygon.contains(&Point::new(longitude, latitude))
    }

    /// True when the interiors of the two polygons intersect. Zones that
    /// only share an edge or a vertex do not overlap.
    pub fn overlaps(&self, other: &ZoneGeometry) -> bool {
        let matrix = self.polygon.relate(&other.polygon);
        matrix.is_intersects() && !matrix.is_touches()
    }
}

impl TryFrom<Value> for ZoneGeometry {
    type Error = OppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_geojson(&value)
    }
}

impl From<ZoneGeometry> for Value {
    fn from(geometry: ZoneGeometry) -> Self {
        geometry.to_geojson()
    }
}

fn ring(points: &[(f64, f64)]) -> OppResult<LineString<f64>> {
    if points.len() < MIN_RING_POSITIONS {
        return Err(OppError::invalid_input(format!(
            "polygon ring needs at least {MIN_RING_POSITIONS} positions, got {}",
            points.len()
        )));
    }
    if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(OppError::invalid_input("polygon coordinates must be finite"));
    }
    if points.first() != points.last() {
        return Err(OppError::invalid_input("polygon ring must be closed"));
    }
    Ok(LineString::new(
        points.iter().map(|&(x, y)| Coord { x, y }).collect(),
    ))
}

fn positions(ring: &Value) -> OppResult<Vec<(f64, f64)>> {
    let items = ring
        .as_array()
        .ok_or_else(|| OppError::invalid_input("polygon ring must be an array"))?;
    items
        .iter()
        .map(|position| {
            let pair = position.as_array().filter(|p| p.len() >= 2).ok_or_else(|| {
                OppError::invalid_input("position must be a [longitude, latitude] array")
            })?;
            match (pair[0].as_f64(), pair[1].as_f64()) {
                (Some(lon), Some(lat)) => Ok((lon, lat)),
                _ => Err(OppError::invalid_input("position values must be numbers")),
            }
        })
        .collect()
}

fn ring_coordinates(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, side: f64) -> ZoneGeometry {
        ZoneGeometry::from_rings(
            &[
                (x0, y0),
                (x0 + side, y0),
                (x0 + side, y0 + side),
                (x0, y0 + side),
                (x0, y0),
            ],
            &[],
        )
        .unwrap()
    }

    #[test]
    fn contains_interior_point_only() {
        let zone = square(0.0, 0.0, 1.0);
        assert!(zone.contains_point(0.5, 0.5));
        assert!(!zone.contains_point(1.5, 0.5));
        assert!(!zone.contains_point(0.0, 0.5), "boundary is not inside");
    }

    #[test]
    fn overlapping_squares() {
        assert!(square(0.0, 0.0, 1.0).overlaps(&square(0.5, 0.5, 1.0)));
        assert!(square(0.0, 0.0, 4.0).overlaps(&square(1.0, 1.0, 1.0)));
    }

    #[test]
    fn adjacent_squares_do_not_overlap() {
        assert!(!square(0.0, 0.0, 1.0).overlaps(&square(1.0, 0.0, 1.0)));
        assert!(!square(0.0, 0.0, 1.0).overlaps(&square(3.0, 3.0, 1.0)));
    }

    #[test]
    fn bounds_cover_the_exterior_ring() {
        let zone = ZoneGeometry::from_rings(
            &[(7.6, 45.0), (7.7, 45.05), (7.65, 45.1), (7.6, 45.0)],
            &[],
        )
        .unwrap();
        let bounds = zone.bounds();
        assert_eq!((bounds.min_lon, bounds.max_lon), (7.6, 7.7));
        assert_eq!((bounds.min_lat, bounds.max_lat), (45.0, 45.1));
    }

    #[test]
    fn touching_bounds_intersect() {
        let a = square(0.0, 0.0, 1.0).bounds();
        assert!(a.intersects(&square(1.0, 0.0, 1.0).bounds()));
        assert!(!a.intersects(&square(1.5, 0.0, 1.0).bounds()));
    }

    #[test]
    fn geojson_roundtrip_preserves_rings() {
        let zone = square(7.6, 45.0, 0.01);
        let parsed = ZoneGeometry::from_geojson(&zone.to_geojson()).unwrap();
        assert_eq!(parsed, zone);
    }

    #[test]
    fn parses_geojson_text() {
        let text = r#"{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#;
        let zone = ZoneGeometry::from_geojson_str(text).unwrap();
        assert!(zone.contains_point(1.0, 1.0));
    }

    #[test]
    fn rejects_non_polygon_and_open_rings() {
        let point = json!({ "type": "Point", "coordinates": [0.0, 0.0] });
        assert!(ZoneGeometry::from_geojson(&point).is_err());

        let open = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]
        });
        assert!(matches!(
            ZoneGeometry::from_geojson(&open),
            Err(OppError::InvalidInput { .. })
        ));

        let short = [(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)];
        assert!(ZoneGeometry::from_rings(&short, &[]).is_err());
    }

    #[test]
    fn hole_excludes_points() {
        let zone = ZoneGeometry::from_rings(
            &[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)],
            &[vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0), (1.0, 1.0)]],
        )
        .unwrap();
        assert!(zone.contains_point(3.0, 3.0));
        assert!(!zone.contains_point(1.5, 1.5));
    }
}
