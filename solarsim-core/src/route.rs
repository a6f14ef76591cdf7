//! Module containing the route altitude profile and its segments.

use crate::imports::*;
use crate::params::M_PER_KM;

/// Default segment length, $m$
pub const SEGMENT_LENGTH_M: f64 = 1_000.0;

/// Ordered altitude samples spaced `segment_length_m` apart along the route.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Route {
    /// Altitude at each sample point, $m$
    pub altitude_m: Array1<f64>,
    /// Horizontal distance between consecutive samples, $m$
    #[serde(default = "default_segment_length_m")]
    pub segment_length_m: f64,
}

fn default_segment_length_m() -> f64 {
    SEGMENT_LENGTH_M
}

/// Stretch of road between two adjacent altitude samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSegment {
    pub index: usize,
    pub altitude_start_m: f64,
    pub altitude_end_m: f64,
    pub segment_length_m: f64,
}

impl RouteSegment {
    /// Road grade in percent, positive uphill
    pub fn grade_perc(&self) -> f64 {
        (self.altitude_end_m - self.altitude_start_m) / self.segment_length_m * 100.0
    }
}

impl Route {
    pub fn new<A: Into<Array1<f64>>>(altitude_m: A, segment_length_m: f64) -> anyhow::Result<Self> {
        let mut route = Self {
            altitude_m: altitude_m.into(),
            segment_length_m,
        };
        route.init()?;
        Ok(route)
    }

    /// Route climbing linearly from `start_m` to `end_m` over `num_points` samples
    pub fn linear(start_m: f64, end_m: f64, num_points: usize) -> anyhow::Result<Self> {
        Self::new(linspace(start_m, end_m, num_points), SEGMENT_LENGTH_M)
    }

    pub fn num_points(&self) -> usize {
        self.altitude_m.len()
    }

    pub fn num_segments(&self) -> usize {
        self.num_points().saturating_sub(1)
    }

    /// Total route length, $km$
    pub fn length_km(&self) -> f64 {
        self.num_segments() as f64 * self.segment_length_m / M_PER_KM
    }

    pub fn segment(&self, i: usize) -> anyhow::Result<RouteSegment> {
        ensure!(
            i < self.num_segments(),
            "segment index {i} out of range for route with {} segments",
            self.num_segments()
        );
        Ok(RouteSegment {
            index: i,
            altitude_start_m: self.altitude_m[i],
            altitude_end_m: self.altitude_m[i + 1],
            segment_length_m: self.segment_length_m,
        })
    }

    pub fn segments(&self) -> impl Iterator<Item = RouteSegment> + '_ {
        self.altitude_m
            .windows(2)
            .into_iter()
            .enumerate()
            .map(|(index, pair)| RouteSegment {
                index,
                altitude_start_m: pair[0],
                altitude_end_m: pair[1],
                segment_length_m: self.segment_length_m,
            })
    }
}

impl Default for Route {
    fn default() -> Self {
        Self {
            altitude_m: Array1::linspace(0.0, 200.0, 316),
            segment_length_m: SEGMENT_LENGTH_M,
        }
    }
}

impl SerdeAPI for Route {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.num_points() >= 2,
            "insufficient route data: need at least 2 altitude samples, got {}",
            self.num_points()
        );
        ensure!(
            self.segment_length_m > 0.0,
            format_dbg!(self.segment_length_m)
        );
        ensure!(
            self.altitude_m.iter().all(|alt| alt.is_finite()),
            "route altitudes must be finite"
        );
        Ok(())
    }
}
