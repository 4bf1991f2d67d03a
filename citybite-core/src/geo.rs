use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn is_usable(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Great-circle distance in kilometres. Unusable coordinates yield 0 so that a
/// bad GPS fix degrades a calculation instead of failing it.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    if !a.is_usable() || !b.is_usable() {
        return 0.0;
    }

    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Circular delivery zone around a hub.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceArea {
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl ServiceArea {
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.is_usable() && haversine_km(self.center, point) <= self.radius_km
    }
}
