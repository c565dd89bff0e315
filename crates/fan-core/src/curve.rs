//! Temperature to duty-cycle mapping along a quadratic Bézier curve.
//!
//! The curve is defined by three control points `(rotation %, temperature)`.
//! A temperature is first normalized to the curve parameter `t` by solving
//! `x(t) = temperature` over the temperature abscissas, then the rotation
//! ordinate is evaluated at that `t`. The middle point shapes the curve; it
//! is not a point the curve passes through.

use serde::{Deserialize, Serialize};
use tracing::debug;

const LINEAR_EPSILON: f64 = 1e-9;
/// Rounding slack on roots near the ends of `[0, 1]`.
const ROOT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    pub min_temp: f64,
    pub max_temp: f64,
    pub control_point_temp: f64,
    pub min_rotation_percent: f64,
    pub max_rotation_percent: f64,
    pub control_point_rotation_percent: f64,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            min_temp: 30.0,
            max_temp: 70.0,
            control_point_temp: 50.0,
            min_rotation_percent: 20.0,
            max_rotation_percent: 100.0,
            control_point_rotation_percent: 50.0,
        }
    }
}

/// A solved point on the curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// Normalized curve parameter in `[0, 1]`.
    pub t: f64,
    pub rotation_percent: f64,
    /// Temperature re-evaluated at `t`, for diagnostics.
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct CurveSolver {
    params: CurveParams,
}

impl CurveSolver {
    pub fn new(params: CurveParams) -> Self {
        Self { params }
    }

    /// Solve the curve for `temperature`. `None` when no parameter in
    /// `[0, 1]` maps to it, which includes every temperature outside
    /// `[min_temp, max_temp]`.
    pub fn solve(&self, temperature: f64) -> Option<CurvePoint> {
        let p = &self.params;
        let t = normalize(temperature, p.min_temp, p.control_point_temp, p.max_temp)?;

        let point = CurvePoint {
            t,
            rotation_percent: bezier(
                t,
                p.min_rotation_percent,
                p.control_point_rotation_percent,
                p.max_rotation_percent,
            ),
            temperature: bezier(t, p.min_temp, p.control_point_temp, p.max_temp),
        };

        debug!(
            temperature,
            t,
            rotation_percent = point.rotation_percent,
            evaluated_temp = point.temperature,
            "curve solved"
        );
        Some(point)
    }
}

/// `(1-t)^2 * p0 + 2(1-t)t * p1 + t^2 * p2`
pub fn bezier(t: f64, p0: f64, p1: f64, p2: f64) -> f64 {
    let u = 1.0 - t;
    u * u * p0 + 2.0 * u * t * p1 + t * t * p2
}

fn normalize(temp: f64, min_temp: f64, cp_temp: f64, max_temp: f64) -> Option<f64> {
    let a = max_temp - 2.0 * cp_temp + min_temp;
    let b = 2.0 * (cp_temp - min_temp);
    let c = min_temp - temp;

    // Control point midway between the ends: x(t) is linear.
    if a.abs() < LINEAR_EPSILON {
        if b == 0.0 {
            return None;
        }
        return unit_root(-c / b);
    }

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }

    let sqrt_d = discriminant.sqrt();
    let t1 = (-b + sqrt_d) / (2.0 * a);
    let t2 = (-b - sqrt_d) / (2.0 * a);

    unit_root(t1).or_else(|| unit_root(t2))
}

fn unit_root(t: f64) -> Option<f64> {
    (-ROOT_TOLERANCE..=1.0 + ROOT_TOLERANCE)
        .contains(&t)
        .then_some(t.clamp(0.0, 1.0))
}
