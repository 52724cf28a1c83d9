//! An equal-area isolatitude pixelation of the sphere.
//!
//! The sphere is cut into `E/2 + 1` rings of equal latitude, `E` being the
//! number of pixels on the equatorial ring. Each ring holds
//! `max(1, round(E * cos(lat)))` pixels of (approximately) equal area, the
//! poles holding a single pixel each. Pixels are numbered row-major from
//! the north pole southwards, so random access by id is O(1).
//!
//! Ids are plain `usize`; coordinates are a function of the id and are
//! cached once at construction, never stored per entity elsewhere.

use std::f64::consts::PI;


/// One ring of equal latitude.
#[derive(Clone, Debug)]
pub struct Ring {
    /// Latitude of the ring center, in degrees.
    pub lat: f64,
    /// Id of the first pixel on the ring.
    pub first: usize,
    /// Number of pixels on the ring.
    pub len: usize,
}

/// Cached spherical position of a pixel.
#[derive(Clone, Copy, Debug)]
pub struct Locus {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees, in `[-180, 180)`.
    pub lon: f64,
    sin_lat: f64,
    cos_lat: f64,
    rad_lon: f64,
}

/// The pixelation itself.
///
/// Cloning is cheap enough but never needed; share it by reference.
#[derive(Clone, Debug)]
pub struct Pixelation {
    eq: usize,
    rings: Vec<Ring>,
    locus: Vec<Locus>,
}

impl Pixelation {
    /// Builds the pixelation for `eq` pixels at the equator.
    ///
    /// `eq` must be even and at least 4; this is checked once here and
    /// relied upon everywhere else.
    pub fn new(eq: usize) -> Pixelation {
        assert!(eq >= 4 && eq % 2 == 0, "equatorial pixels must be even and >= 4, got {}", eq);

        let num_rings = eq / 2 + 1;
        let step = 180.0 / (num_rings - 1) as f64;

        let mut rings = Vec::with_capacity(num_rings);
        let mut locus = Vec::new();
        let mut first = 0;
        for r in 0..num_rings {
            let lat = 90.0 - r as f64 * step;
            let len = ring_pixels(eq, lat);
            for c in 0..len {
                let lon = -180.0 + (c as f64 + 0.5) * 360.0 / len as f64;
                locus.push(Locus::new(lat, lon));
            }
            rings.push(Ring { lat, first, len });
            first += len;
        }

        Pixelation { eq, rings, locus }
    }

    /// Number of pixels at the equator.
    #[inline]
    pub fn equator(&self) -> usize {
        self.eq
    }

    /// Total number of pixels.
    #[inline]
    pub fn len(&self) -> usize {
        self.locus.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locus.is_empty()
    }

    /// Number of isolatitude rings.
    #[inline]
    pub fn num_rings(&self) -> usize {
        self.rings.len()
    }

    /// The rings, north to south.
    #[inline]
    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    /// Angular height of a ring, in radians.
    ///
    /// This is the unit in which ring distances are measured.
    #[inline]
    pub fn ring_step(&self) -> f64 {
        PI / (self.rings.len() - 1) as f64
    }

    /// Position of pixel `id`.
    #[inline]
    pub fn locus(&self, id: usize) -> Locus {
        self.locus[id]
    }

    /// Ring index of pixel `id`.
    pub fn ring_of(&self, id: usize) -> usize {
        debug_assert!(id < self.len());
        self.rings.partition_point(|r| r.first <= id) - 1
    }

    /// Id of the pixel containing the point at `lat`, `lon` (degrees).
    pub fn pixel_of(&self, lat: f64, lon: f64) -> usize {
        let lat = lat.max(-90.0).min(90.0);
        let lon = wrap_lon(lon);

        let step = 180.0 / (self.rings.len() - 1) as f64;
        let mut r = ((90.0 - lat) / step).round() as usize;
        if r >= self.rings.len() {
            r = self.rings.len() - 1;
        }
        let ring = &self.rings[r];
        let mut c = ((lon + 180.0) / 360.0 * ring.len as f64).floor() as usize;
        if c >= ring.len {
            c = ring.len - 1;
        }
        ring.first + c
    }

    /// Great-circle angle between two pixel centers, in radians.
    pub fn angle(&self, a: usize, b: usize) -> f64 {
        if a == b {
            return 0.0;
        }
        let pa = self.locus[a];
        let pb = self.locus[b];
        let cos = pa.sin_lat * pb.sin_lat
            + pa.cos_lat * pb.cos_lat * (pa.rad_lon - pb.rad_lon).cos();
        cos.max(-1.0).min(1.0).acos()
    }

    /// Distance between two pixels, in ring units.
    ///
    /// The maximum possible value is `num_rings() - 1` (pole to pole).
    #[inline]
    pub fn ring_distance(&self, a: usize, b: usize) -> usize {
        (self.angle(a, b) / self.ring_step()).round() as usize
    }
}

impl Locus {
    fn new(lat: f64, lon: f64) -> Locus {
        let rad_lat = lat.to_radians();
        Locus {
            lat,
            lon,
            sin_lat: rad_lat.sin(),
            cos_lat: rad_lat.cos(),
            rad_lon: lon.to_radians(),
        }
    }
}

#[inline]
fn ring_pixels(eq: usize, lat: f64) -> usize {
    let n = (eq as f64 * lat.to_radians().cos()).round() as usize;
    n.max(1)
}

#[inline]
fn wrap_lon(lon: f64) -> f64 {
    let w = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid of an exact multiple may land on 360.0 - 180.0.
    if w >= 180.0 {
        w - 360.0
    } else {
        w
    }
}
