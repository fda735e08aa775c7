//! British National Grid (OSGB36, EPSG:27700) to WGS84 lat/lon.
//!
//! Inverse transverse Mercator on the Airy 1830 ellipsoid, followed by a
//! seven-parameter Helmert shift from OSGB36 to WGS84. Accurate to a few
//! metres, which is well inside the spacing between bus stops.

struct Ellipsoid {
    a: f64,
    b: f64,
}

impl Ellipsoid {
    fn e2(&self) -> f64 {
        1.0 - (self.b * self.b) / (self.a * self.a)
    }
}

const AIRY_1830: Ellipsoid = Ellipsoid {
    a: 6_377_563.396,
    b: 6_356_256.909,
};

const WGS84: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    b: 6_356_752.3142,
};

// National Grid projection constants
const F0: f64 = 0.999_601_271_7;
const LAT0_DEG: f64 = 49.0;
const LON0_DEG: f64 = -2.0;
const E0: f64 = 400_000.0;
const N0: f64 = -100_000.0;

// OSGB36 -> WGS84 Helmert parameters (metres, ppm, arc seconds)
const TX: f64 = 446.448;
const TY: f64 = -125.157;
const TZ: f64 = 542.060;
const S_PPM: f64 = -20.4894;
const RX_SEC: f64 = 0.1502;
const RY_SEC: f64 = 0.2470;
const RZ_SEC: f64 = 0.8421;

/// Converts an easting/northing pair to `(latitude, longitude)` in WGS84 degrees.
pub fn easting_northing_to_lat_lon(easting: f64, northing: f64) -> (f64, f64) {
    let (lat, lon) = grid_to_osgb36(easting, northing);
    let (x, y, z) = to_cartesian(lat, lon, &AIRY_1830);
    let (x, y, z) = helmert(x, y, z);
    let (lat, lon) = from_cartesian(x, y, z, &WGS84);
    (lat.to_degrees(), lon.to_degrees())
}

fn meridional_arc(lat: f64, lat0: f64, n: f64, b: f64) -> f64 {
    let (n2, n3) = (n * n, n * n * n);
    let d = lat - lat0;
    let s = lat + lat0;
    let ma = (1.0 + n + 1.25 * n2 + 1.25 * n3) * d;
    let mb = (3.0 * n + 3.0 * n2 + 2.625 * n3) * d.sin() * s.cos();
    let mc = (1.875 * n2 + 1.875 * n3) * (2.0 * d).sin() * (2.0 * s).cos();
    let md = (35.0 / 24.0) * n3 * (3.0 * d).sin() * (3.0 * s).cos();
    b * F0 * (ma - mb + mc - md)
}

/// Grid coordinates to OSGB36 geodetic latitude/longitude in radians.
fn grid_to_osgb36(easting: f64, northing: f64) -> (f64, f64) {
    let Ellipsoid { a, b } = AIRY_1830;
    let e2 = AIRY_1830.e2();
    let n = (a - b) / (a + b);
    let lat0 = LAT0_DEG.to_radians();
    let lon0 = LON0_DEG.to_radians();

    let mut lat = lat0;
    let mut m = 0.0;
    loop {
        lat += (northing - N0 - m) / (a * F0);
        m = meridional_arc(lat, lat0, n, b);
        if (northing - N0 - m).abs() < 1e-5 {
            break;
        }
    }

    let sin_lat = lat.sin();
    let nu = a * F0 / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let rho = a * F0 * (1.0 - e2) / (1.0 - e2 * sin_lat * sin_lat).powf(1.5);
    let eta2 = nu / rho - 1.0;

    let tan = lat.tan();
    let (tan2, tan4, tan6) = (tan.powi(2), tan.powi(4), tan.powi(6));
    let sec = 1.0 / lat.cos();

    let vii = tan / (2.0 * rho * nu);
    let viii = tan / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * tan2 + eta2 - 9.0 * tan2 * eta2);
    let ix = tan / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * tan2 + 45.0 * tan4);
    let x = sec / nu;
    let xi = sec / (6.0 * nu.powi(3)) * (nu / rho + 2.0 * tan2);
    let xii = sec / (120.0 * nu.powi(5)) * (5.0 + 28.0 * tan2 + 24.0 * tan4);
    let xiia =
        sec / (5040.0 * nu.powi(7)) * (61.0 + 662.0 * tan2 + 1320.0 * tan4 + 720.0 * tan6);

    let de = easting - E0;
    let lat = lat - vii * de.powi(2) + viii * de.powi(4) - ix * de.powi(6);
    let lon = lon0 + x * de - xi * de.powi(3) + xii * de.powi(5) - xiia * de.powi(7);
    (lat, lon)
}

fn to_cartesian(lat: f64, lon: f64, ellipsoid: &Ellipsoid) -> (f64, f64, f64) {
    let e2 = ellipsoid.e2();
    let nu = ellipsoid.a / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    (
        nu * lat.cos() * lon.cos(),
        nu * lat.cos() * lon.sin(),
        (1.0 - e2) * nu * lat.sin(),
    )
}

fn helmert(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let s = 1.0 + S_PPM * 1e-6;
    let arcsec = |v: f64| (v / 3600.0).to_radians();
    let (rx, ry, rz) = (arcsec(RX_SEC), arcsec(RY_SEC), arcsec(RZ_SEC));
    (
        TX + s * x - rz * y + ry * z,
        TY + rz * x + s * y - rx * z,
        TZ - ry * x + rx * y + s * z,
    )
}

fn from_cartesian(x: f64, y: f64, z: f64, ellipsoid: &Ellipsoid) -> (f64, f64) {
    let e2 = ellipsoid.e2();
    let p = (x * x + y * y).sqrt();
    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let nu = ellipsoid.a / (1.0 - e2 * lat.sin().powi(2)).sqrt();
        let next = (z + e2 * nu * lat.sin()).atan2(p);
        if (next - lat).abs() < 1e-12 {
            lat = next;
            break;
        }
        lat = next;
    }
    (lat, y.atan2(x))
}
