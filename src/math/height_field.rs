use crate::error::TerrainError;
use bevy::math::{DVec2, DVec3};
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// The parameters of the fractal noise, which fully determine the [`HeightField`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TerrainParameters {
    /// The seed of the underlying coherent noise.
    pub seed: u32,
    /// The horizontal extent of one noise period at the first octave.
    pub scale: f64,
    /// The number of noise layers that are summed up.
    pub octaves: u32,
    /// The frequency multiplier between two consecutive octaves.
    pub lacunarity: f64,
    /// The amplitude of each octave is multiplied by `2^-persistence`.
    pub persistence: f64,
    /// The exponent applied to the normalized noise value.
    pub exponentiation: f64,
    /// The elevation of a normalized noise value of one.
    pub height: f64,
}

impl Default for TerrainParameters {
    fn default() -> Self {
        Self {
            seed: 1,
            scale: 1100.0,
            octaves: 6,
            lacunarity: 1.8,
            persistence: 0.707,
            exponentiation: 4.5,
            height: 300.0,
        }
    }
}

impl TerrainParameters {
    pub fn validate(&self) -> Result<(), TerrainError> {
        if self.octaves == 0 {
            return Err(TerrainError::invalid_parameter(
                "octaves",
                "at least one octave is required",
            ));
        }
        if self.scale == 0.0 || !self.scale.is_finite() {
            return Err(TerrainError::invalid_parameter(
                "scale",
                format!("expected a finite, non-zero scale, got {}", self.scale),
            ));
        }

        let finite = [
            ("lacunarity", self.lacunarity),
            ("persistence", self.persistence),
            ("exponentiation", self.exponentiation),
            ("height", self.height),
        ];

        for (name, value) in finite {
            if !value.is_finite() {
                return Err(TerrainError::invalid_parameter(
                    name,
                    format!("expected a finite value, got {value}"),
                ));
            }
        }

        if self.lacunarity <= 0.0 {
            return Err(TerrainError::invalid_parameter(
                "lacunarity",
                format!("expected a positive lacunarity, got {}", self.lacunarity),
            ));
        }
        // a zero noise total raised to a negative power is infinite
        if self.exponentiation < 0.0 {
            return Err(TerrainError::invalid_parameter(
                "exponentiation",
                format!(
                    "expected a non negative exponent, got {}",
                    self.exponentiation
                ),
            ));
        }

        Ok(())
    }
}

/// A deterministic height field based on layered coherent noise.
///
/// Sampling is a pure function of the coordinate and the [`TerrainParameters`],
/// so neighbouring nodes sampling the same world position agree exactly.
/// The height field is `Send + Sync` and may be shared between worker threads.
#[derive(Clone)]
pub struct HeightField {
    params: TerrainParameters,
    noise: Perlin,
}

impl HeightField {
    pub fn new(params: TerrainParameters) -> Result<Self, TerrainError> {
        params.validate()?;

        Ok(Self {
            params,
            noise: Perlin::new(params.seed),
        })
    }

    pub fn params(&self) -> &TerrainParameters {
        &self.params
    }

    /// Computes the elevation at the world position `(x, y)`.
    pub fn elevation(&self, x: f64, y: f64) -> f64 {
        let params = &self.params;
        let gain = 2.0_f64.powf(-params.persistence);

        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut normalization = 0.0;
        let mut total = 0.0;

        for _ in 0..params.octaves {
            let point = [
                x / params.scale * frequency,
                y / params.scale * frequency,
            ];
            let noise = self.noise.get(point) * 0.5 + 0.5;

            total += noise * amplitude;
            normalization += amplitude;
            amplitude *= gain;
            frequency *= params.lacunarity;
        }

        let total = (total / normalization).clamp(0.0, 1.0);

        total.powf(params.exponentiation) * params.height
    }

    #[inline]
    pub fn elevation_at(&self, position: DVec2) -> f64 {
        self.elevation(position.x, position.y)
    }

    /// Approximates the surface normal at `(x, y)` with central differences.
    ///
    /// The normal is expressed in the world frame, where `z` is the up axis.
    pub fn normal(&self, x: f64, y: f64, epsilon: f64, height_factor: f64) -> DVec3 {
        let dx = (self.elevation(x + epsilon, y) - self.elevation(x - epsilon, y)) * height_factor;
        let dy = (self.elevation(x, y + epsilon) - self.elevation(x, y - epsilon)) * height_factor;

        DVec3::new(-dx, -dy, 2.0 * epsilon).normalize()
    }
}
