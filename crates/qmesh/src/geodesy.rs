//! WGS84 geodetic/ECEF conversions and a small Cartesian vector type.
//!
//! Grounded on the `wgs84` module in the teacher's HYPC format crate, which
//! carries the same constants and a flat `geodetic_to_ecef`/`ecef_to_geodetic`
//! pair. Generalized here into a vector newtype with arithmetic, since the
//! bounding-geometry and stitcher code need cross products, dot products, and
//! normalization that HYPC's point-cloud-of-offsets model never required.

/// Semi-major axis (equatorial radius) in meters.
pub const WGS84_A: f64 = 6_378_137.0;

/// Semi-minor axis (polar radius) in meters.
pub const WGS84_B: f64 = 6_356_752.314_245_179_3;

/// First eccentricity squared.
pub const WGS84_E2: f64 = 0.006_694_379_990_197_58;

/// A Cartesian 3-vector, used both for ECEF points and plain direction math.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    #[inline]
    pub fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }

    #[inline]
    pub fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }

    #[inline]
    pub fn scale(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    /// Component-wise product, used to scale points by inverse ellipsoid
    /// semi-axes in the horizon-occlusion-point computation.
    #[inline]
    pub fn mul_components(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x * o.x, self.y * o.y, self.z * o.z)
    }

    #[inline]
    pub fn dot(self, o: Vec3) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    #[inline]
    pub fn cross(self, o: Vec3) -> Vec3 {
        Vec3::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    #[inline]
    pub fn norm_squared(self) -> f64 {
        self.dot(self)
    }

    #[inline]
    pub fn norm(self) -> f64 {
        self.norm_squared().sqrt()
    }

    pub fn normalized(self) -> Vec3 {
        let n = self.norm();
        if n == 0.0 {
            Vec3::ZERO
        } else {
            self.scale(1.0 / n)
        }
    }

    pub fn distance_squared(self, o: Vec3) -> f64 {
        self.sub(o).norm_squared()
    }
}

/// Linear interpolation between two points: `(1-t)*p + t*q`.
#[inline]
pub fn lerp(p: Vec3, q: Vec3, t: f64) -> Vec3 {
    p.scale(1.0 - t).add(q.scale(t))
}

/// Half the magnitude of `a × b`, used as a face-normal weight. Takes the
/// two raw vertex positions rather than edge vectors, per the accumulation
/// formula this is always paired with.
#[inline]
pub fn triangle_area(a: Vec3, b: Vec3) -> f64 {
    0.5 * a.cross(b).norm()
}

/// Convert geographic (longitude, latitude, ellipsoidal height) to ECEF.
///
/// `lon_deg`/`lat_deg` in degrees, `h_m` in meters.
pub fn llh_to_ecef(lon_deg: f64, lat_deg: f64, h_m: f64) -> Vec3 {
    let lat_rad = lat_deg.to_radians();
    let lon_rad = lon_deg.to_radians();
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    let x = (n + h_m) * cos_lat * cos_lon;
    let y = (n + h_m) * cos_lat * sin_lon;
    let z = (n * (1.0 - WGS84_E2) + h_m) * sin_lat;

    Vec3::new(x, y, z)
}

/// Convert ECEF to geographic (longitude, latitude, ellipsoidal height).
///
/// Returns `(lon_deg, lat_deg, h_m)`.
pub fn ecef_to_llh(p: Vec3) -> (f64, f64, f64) {
    let e2p = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
    let r = (p.x * p.x + p.y * p.y).sqrt();
    let lon = p.y.atan2(p.x);

    let theta = (p.z * WGS84_A).atan2(r * WGS84_B);
    let (sin_theta, cos_theta) = theta.sin_cos();

    let lat_numerator = p.z + e2p * WGS84_B * sin_theta * sin_theta * sin_theta;
    let lat_denominator = r - WGS84_E2 * WGS84_A * cos_theta * cos_theta * cos_theta;
    let lat = lat_numerator.atan2(lat_denominator);

    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let h = r / lat.cos() - n;

    (lon.to_degrees(), lat.to_degrees(), h)
}
