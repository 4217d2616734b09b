use geo::{BooleanOps, BoundingRect, Intersects, MultiPolygon, Polygon};
use tracing::debug;

/// Clip every geometry to `footprint` and union the pieces. Geometries whose
/// bounding box misses the footprint's are skipped without clipping.
pub fn clip_to_footprint(geometries: &[MultiPolygon<f64>], footprint: &Polygon<f64>) -> MultiPolygon<f64> {
    let clip = MultiPolygon::new(vec![footprint.clone()]);
    let Some(footprint_bbox) = footprint.bounding_rect() else {
        return MultiPolygon::new(vec![]);
    };
    let mut retained = MultiPolygon::new(vec![]);
    let mut candidates = 0;
    for geometry in geometries {
        if !geometry.bounding_rect().is_some_and(|bbox| bbox.intersects(&footprint_bbox)) {
            continue;
        }
        candidates += 1;
        let piece = geometry.intersection(&clip);
        if !piece.0.is_empty() {
            retained = retained.union(&piece);
        }
    }
    debug!(
        "Retained {} polygon(s) from {} of {} geometries after clipping",
        retained.0.len(),
        candidates,
        geometries.len()
    );
    retained
}
