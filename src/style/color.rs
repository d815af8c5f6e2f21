use serde::Serialize;

/// sRGB color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
pub const GRAY: Rgb = Rgb::new(0.5, 0.5, 0.5);
pub const SILVER: Rgb = Rgb::new(0.75, 0.75, 0.75);

const D65: [f64; 3] = [0.95047, 1.0, 1.08883];

impl Rgb {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn to_u8(&self) -> [u8; 3] {
        let channel = |value: f64| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        [channel(self.r), channel(self.g), channel(self.b)]
    }

    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_u8();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    /// Near-gray: no two channels differ by 0.1 or more.
    pub fn is_grayscale(&self) -> bool {
        let max_diff = (self.r - self.g)
            .abs()
            .max((self.g - self.b).abs())
            .max((self.b - self.r).abs());
        max_diff < 0.1
    }

    /// CIE L*a*b* under D65, L in `0..=100`.
    pub fn lab(&self) -> [f64; 3] {
        let r = linearize(self.r);
        let g = linearize(self.g);
        let b = linearize(self.b);
        let x = 0.4124564 * r + 0.3575761 * g + 0.1804375 * b;
        let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
        let z = 0.0193339 * r + 0.1191920 * g + 0.9503041 * b;
        let fx = lab_f(x / D65[0]);
        let fy = lab_f(y / D65[1]);
        let fz = lab_f(z / D65[2]);
        [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
    }

    /// CIEDE2000 difference scaled to `0..=1` (black to white is 1.0).
    pub fn distance_ciede2000(&self, other: &Rgb) -> f64 {
        ciede2000(self.lab(), other.lab()) / 100.0
    }

    /// Hue in degrees, saturation and value in `0..=1`.
    pub fn hsv(&self) -> (f64, f64, f64) {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let delta = max - min;
        let value = max;
        let saturation = if max > 0.0 { delta / max } else { 0.0 };
        let mut hue = 0.0;
        if delta > 0.0 {
            if max == self.r {
                hue = ((self.g - self.b) / delta) % 6.0;
            } else if max == self.g {
                hue = (self.b - self.r) / delta + 2.0;
            } else {
                hue = (self.r - self.g) / delta + 4.0;
            }
            hue *= 60.0;
            if hue < 0.0 {
                hue += 360.0;
            }
        }
        (hue, saturation, value)
    }

    pub fn from_hsv(hue: f64, saturation: f64, value: f64) -> Self {
        let hp = hue / 60.0;
        let c = value * saturation;
        let x = c * (1.0 - ((hp % 2.0) - 1.0).abs());
        let m = value - c;
        let (r, g, b) = match hp {
            h if (0.0..1.0).contains(&h) => (c, x, 0.0),
            h if (1.0..2.0).contains(&h) => (x, c, 0.0),
            h if (2.0..3.0).contains(&h) => (0.0, c, x),
            h if (3.0..4.0).contains(&h) => (0.0, x, c),
            h if (4.0..5.0).contains(&h) => (x, 0.0, c),
            h if (5.0..6.0).contains(&h) => (c, 0.0, x),
            _ => (0.0, 0.0, 0.0),
        };
        Rgb::new(r + m, g + m, b + m)
    }

    /// Blends in HSV space; `t = 0` keeps `self`, `t = 1` yields `other`.
    /// An achromatic side takes the other side's hue so grays do not drag the hue toward red.
    pub fn blend_hsv(&self, other: &Rgb, t: f64) -> Rgb {
        let (mut h1, s1, v1) = self.hsv();
        let (mut h2, s2, v2) = other.hsv();
        if s1 == 0.0 && s2 != 0.0 {
            h1 = h2;
        } else if s2 == 0.0 && s1 != 0.0 {
            h2 = h1;
        }
        Rgb::from_hsv(
            interpolate_angle(h1, h2, t),
            s1 + t * (s2 - s1),
            v1 + t * (v2 - v1),
        )
    }
}

fn linearize(value: f64) -> f64 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn interpolate_angle(from: f64, to: f64, t: f64) -> f64 {
    let delta = (((to - from) % 360.0) + 540.0) % 360.0 - 180.0;
    (from + t * delta + 360.0) % 360.0
}

fn ciede2000(lab1: [f64; 3], lab2: [f64; 3]) -> f64 {
    let [l1, a1, b1] = lab1;
    let [l2, a2, b2] = lab2;
    let pow25_7 = 25f64.powi(7);

    let c1 = a1.hypot(b1);
    let c2 = a2.hypot(b2);
    let c_bar7 = ((c1 + c2) / 2.0).powi(7);
    let g = 0.5 * (1.0 - (c_bar7 / (c_bar7 + pow25_7)).sqrt());
    let a1p = (1.0 + g) * a1;
    let a2p = (1.0 + g) * a2;
    let c1p = a1p.hypot(b1);
    let c2p = a2p.hypot(b2);
    let h1p = hue_degrees(b1, a1p);
    let h2p = hue_degrees(b2, a2p);

    let delta_l = l2 - l1;
    let delta_c = c2p - c1p;
    let delta_h = if c1p * c2p == 0.0 {
        0.0
    } else {
        let diff = h2p - h1p;
        if diff.abs() <= 180.0 {
            diff
        } else if diff > 180.0 {
            diff - 360.0
        } else {
            diff + 360.0
        }
    };
    let delta_big_h = 2.0 * (c1p * c2p).sqrt() * (delta_h.to_radians() / 2.0).sin();

    let l_bar = (l1 + l2) / 2.0;
    let c_bar_p = (c1p + c2p) / 2.0;
    let h_bar = if c1p * c2p == 0.0 {
        h1p + h2p
    } else if (h1p - h2p).abs() <= 180.0 {
        (h1p + h2p) / 2.0
    } else if h1p + h2p < 360.0 {
        (h1p + h2p + 360.0) / 2.0
    } else {
        (h1p + h2p - 360.0) / 2.0
    };

    let t = 1.0 - 0.17 * (h_bar - 30.0).to_radians().cos()
        + 0.24 * (2.0 * h_bar).to_radians().cos()
        + 0.32 * (3.0 * h_bar + 6.0).to_radians().cos()
        - 0.20 * (4.0 * h_bar - 63.0).to_radians().cos();
    let delta_theta = 30.0 * (-((h_bar - 275.0) / 25.0).powi(2)).exp();
    let c_bar_p7 = c_bar_p.powi(7);
    let r_c = 2.0 * (c_bar_p7 / (c_bar_p7 + pow25_7)).sqrt();
    let l_offset = (l_bar - 50.0).powi(2);
    let s_l = 1.0 + 0.015 * l_offset / (20.0 + l_offset).sqrt();
    let s_c = 1.0 + 0.045 * c_bar_p;
    let s_h = 1.0 + 0.015 * c_bar_p * t;
    let r_t = -(2.0 * delta_theta).to_radians().sin() * r_c;

    let dl = delta_l / s_l;
    let dc = delta_c / s_c;
    let dh = delta_big_h / s_h;
    (dl * dl + dc * dc + dh * dh + r_t * dc * dh).sqrt()
}

fn hue_degrees(b: f64, a_prime: f64) -> f64 {
    if b == 0.0 && a_prime == 0.0 {
        return 0.0;
    }
    let hue = b.atan2(a_prime).to_degrees();
    if hue < 0.0 { hue + 360.0 } else { hue }
}
