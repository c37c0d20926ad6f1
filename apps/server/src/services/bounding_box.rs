// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounding boxes in the LV95 plane and their WGS84 catalog queries.

/// An axis-aligned bounding box in LV95 (EPSG:2056) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_easting: f64,
    pub min_northing: f64,
    pub max_easting: f64,
    pub max_northing: f64,
}

impl BoundingBox {
    /// SW/NE corners in longitude/latitude, comma-separated as the STAC
    /// `bbox` query parameter expects.
    pub fn wgs84_query_string(&self) -> String {
        let (min_lon, min_lat) = lv95_to_wgs84(self.min_easting, self.min_northing);
        let (max_lon, max_lat) = lv95_to_wgs84(self.max_easting, self.max_northing);
        format!("{min_lon},{min_lat},{max_lon},{max_lat}")
    }
}

/// Approximate LV95 to WGS84 conversion after the published swisstopo
/// formulas, accurate to about a metre over Switzerland.
fn lv95_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let y = (easting - 2_600_000.0) / 1_000_000.0;
    let x = (northing - 1_200_000.0) / 1_000_000.0;

    let lon = 2.6779094 + 4.728982 * y + 0.791484 * y * x + 0.1306 * y * x.powi(2)
        - 0.0436 * y.powi(3);
    let lat = 16.9023892 + 3.238272 * x
        - 0.270978 * y.powi(2)
        - 0.002528 * x.powi(2)
        - 0.0447 * y.powi(2) * x
        - 0.0140 * x.powi(3);

    // unit conversion from 10000'' to degrees
    (lon * 100.0 / 36.0, lat * 100.0 / 36.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn converts_the_lv95_origin_to_bern() {
        let (lon, lat) = lv95_to_wgs84(2_600_000.0, 1_200_000.0);
        assert_relative_eq!(lon, 7.438632, epsilon = 1e-4);
        assert_relative_eq!(lat, 46.951083, epsilon = 1e-4);
    }

    #[test]
    fn query_string_is_sw_ne_ordered() {
        let bbox = BoundingBox {
            min_easting: 2_600_000.0,
            min_northing: 1_199_000.0,
            max_easting: 2_601_000.0,
            max_northing: 1_200_000.0,
        };
        let query = bbox.wgs84_query_string();
        let parts: Vec<f64> = query.split(',').map(|p| p.parse().unwrap()).collect();
        assert_eq!(parts.len(), 4);
        assert!(parts[0] < parts[2], "west of east");
        assert!(parts[1] < parts[3], "south of north");
    }
}
