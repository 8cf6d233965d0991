use crate::{
    math::{HeightField, NodeBounds, NodeCoordinate},
    util::node_seed,
};
use bevy::math::DVec2;
use noise::{NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// A single accepted vegetation instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// The world position on the terrain plane.
    pub position: DVec2,
    /// The sampled terrain height at the position, including the height factor.
    pub height: f32,
    /// The rotation around the up axis in radians.
    pub rotation: f32,
    /// The uniform scale of the instance.
    pub scale: f32,
}

/// A coherent noise mask, that restricts where a [`VegetationLayer`] may grow.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoiseMask {
    pub seed: u32,
    /// The horizontal extent of one noise period.
    pub scale: f64,
    /// The lower bound of the accepted mask range in `[0, 1]`.
    pub min: f64,
    /// The upper bound of the accepted mask range in `[0, 1]`.
    pub max: f64,
}

impl NoiseMask {
    fn sampler(&self) -> MaskSampler {
        MaskSampler {
            noise: Perlin::new(self.seed),
            mask: *self,
        }
    }
}

struct MaskSampler {
    noise: Perlin,
    mask: NoiseMask,
}

impl MaskSampler {
    fn accepts(&self, position: DVec2) -> bool {
        let point = [position.x / self.mask.scale, position.y / self.mask.scale];
        let value = self.noise.get(point) * 0.5 + 0.5;

        (self.mask.min..=self.mask.max).contains(&value)
    }
}

/// The configuration of one kind of vegetation (e.g. grass or trees).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VegetationLayer {
    /// The number of candidate points tested per node.
    pub max_candidates: u32,
    /// The lowest elevation at which the vegetation grows.
    pub min_height: f64,
    /// The highest elevation at which the vegetation grows.
    pub max_height: f64,
    #[serde(default)]
    pub mask: Option<NoiseMask>,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl VegetationLayer {
    pub fn grass() -> Self {
        Self {
            max_candidates: 512,
            min_height: 0.5,
            max_height: 60.0,
            mask: None,
            min_scale: 0.6,
            max_scale: 1.2,
        }
    }

    pub fn trees() -> Self {
        Self {
            max_candidates: 48,
            min_height: 0.5,
            max_height: 80.0,
            mask: Some(NoiseMask {
                seed: 7,
                scale: 600.0,
                min: 0.55,
                max: 1.0,
            }),
            min_scale: 3.0,
            max_scale: 6.0,
        }
    }

    /// Scatters up to `max_candidates` points uniformly inside `bounds` and yields those,
    /// whose elevation lies within the height band and which pass the noise mask.
    ///
    /// The sequence is lazy and fully determined by `bounds`, `max_candidates` and `seed`.
    /// Each candidate consumes the same random draws, whether it is accepted or not.
    pub fn scatter<'a>(
        &self,
        bounds: NodeBounds,
        max_candidates: u32,
        field: &'a HeightField,
        seed: u64,
        height_factor: f32,
    ) -> impl Iterator<Item = Placement> + 'a {
        let layer = *self;
        let mask = layer.mask.map(|mask| mask.sampler());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let extent = bounds.max - bounds.min;

        (0..max_candidates).filter_map(move |_| {
            let offset = DVec2::new(rng.random::<f64>(), rng.random::<f64>());
            let rotation = rng.random::<f32>() * TAU;
            let scale = layer.min_scale + rng.random::<f32>() * (layer.max_scale - layer.min_scale);

            let position = bounds.min + offset * extent;
            let elevation = field.elevation_at(position);

            if !(layer.min_height..=layer.max_height).contains(&elevation) {
                return None;
            }
            if let Some(mask) = &mask {
                if !mask.accepts(position) {
                    return None;
                }
            }

            Some(Placement {
                position,
                height: (elevation * height_factor as f64) as f32,
                rotation,
                scale,
            })
        })
    }
}

/// Places the vegetation of detailed leaf nodes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VegetationPlacer {
    pub grass: VegetationLayer,
    pub trees: VegetationLayer,
    /// Mixed into every node seed, so that different worlds grow different vegetation.
    #[serde(default)]
    pub seed: u64,
}

impl Default for VegetationPlacer {
    fn default() -> Self {
        Self {
            grass: VegetationLayer::grass(),
            trees: VegetationLayer::trees(),
            seed: 0,
        }
    }
}

impl VegetationPlacer {
    const GRASS_SALT: u64 = 0x6772_6173_73;
    const TREE_SALT: u64 = 0x7472_6565;

    pub fn place_grass(
        &self,
        coordinate: NodeCoordinate,
        bounds: NodeBounds,
        field: &HeightField,
        height_factor: f32,
    ) -> Vec<Placement> {
        let seed = node_seed(coordinate, self.seed ^ Self::GRASS_SALT);

        self.grass
            .scatter(bounds, self.grass.max_candidates, field, seed, height_factor)
            .collect()
    }

    pub fn place_trees(
        &self,
        coordinate: NodeCoordinate,
        bounds: NodeBounds,
        field: &HeightField,
        height_factor: f32,
    ) -> Vec<Placement> {
        let seed = node_seed(coordinate, self.seed ^ Self::TREE_SALT);

        self.trees
            .scatter(bounds, self.trees.max_candidates, field, seed, height_factor)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::TerrainParameters;

    fn field() -> HeightField {
        HeightField::new(TerrainParameters {
            scale: 400.0,
            exponentiation: 1.0,
            height: 100.0,
            ..TerrainParameters::default()
        })
        .unwrap()
    }

    fn bounds() -> NodeBounds {
        NodeBounds::new(DVec2::new(1000.0, -500.0), DVec2::new(1500.0, 0.0))
    }

    fn everywhere() -> VegetationLayer {
        VegetationLayer {
            max_candidates: 64,
            min_height: f64::NEG_INFINITY,
            max_height: f64::INFINITY,
            mask: None,
            min_scale: 1.0,
            max_scale: 2.0,
        }
    }

    #[test]
    fn scatter_is_reproducible() {
        let field = field();
        let layer = VegetationLayer::grass();

        let first: Vec<_> = layer.scatter(bounds(), 256, &field, 42, 1.0).collect();
        let second: Vec<_> = layer.scatter(bounds(), 256, &field, 42, 1.0).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn different_seeds_scatter_differently() {
        let field = field();
        let layer = everywhere();

        let first: Vec<_> = layer.scatter(bounds(), 16, &field, 1, 1.0).collect();
        let second: Vec<_> = layer.scatter(bounds(), 16, &field, 2, 1.0).collect();

        assert_ne!(first, second);
    }

    #[test]
    fn placements_stay_inside_bounds() {
        let field = field();
        let layer = everywhere();
        let placements: Vec<_> = layer.scatter(bounds(), 64, &field, 3, 2.0).collect();

        // without a height band or mask every candidate is accepted
        assert_eq!(placements.len(), 64);

        for placement in placements {
            assert!(bounds().contains_inclusive(placement.position));
            assert!((1.0..=2.0).contains(&placement.scale));
            assert_eq!(
                placement.height,
                (field.elevation_at(placement.position) * 2.0) as f32
            );
        }
    }

    #[test]
    fn height_band_filters_candidates() {
        let field = field();
        let layer = VegetationLayer {
            min_height: 40.0,
            max_height: 60.0,
            ..everywhere()
        };

        for placement in layer.scatter(bounds(), 256, &field, 9, 1.0) {
            let elevation = field.elevation_at(placement.position);
            assert!((40.0..=60.0).contains(&elevation));
        }
    }

    #[test]
    fn accepted_candidates_keep_their_draws() {
        let field = field();
        let all: Vec<_> = everywhere().scatter(bounds(), 128, &field, 5, 1.0).collect();
        let banded = VegetationLayer {
            min_height: 30.0,
            max_height: 70.0,
            ..everywhere()
        };

        // filtering must not shift the random sequence of later candidates
        let expected: Vec<_> = all
            .iter()
            .copied()
            .filter(|placement| (30.0..=70.0).contains(&field.elevation_at(placement.position)))
            .collect();
        let filtered: Vec<_> = banded.scatter(bounds(), 128, &field, 5, 1.0).collect();

        assert_eq!(filtered, expected);
    }

    #[test]
    fn empty_mask_range_rejects_everything() {
        let field = field();
        let layer = VegetationLayer {
            mask: Some(NoiseMask {
                seed: 3,
                scale: 100.0,
                min: 2.0,
                max: 3.0,
            }),
            ..everywhere()
        };

        assert_eq!(layer.scatter(bounds(), 64, &field, 1, 1.0).count(), 0);
    }

    #[test]
    fn placer_is_stable_per_node() {
        let field = field();
        let placer = VegetationPlacer::default();
        let coordinate = NodeCoordinate::new(4, 3, 9);

        assert_eq!(
            placer.place_trees(coordinate, bounds(), &field, 1.0),
            placer.place_trees(coordinate, bounds(), &field, 1.0)
        );
        assert_eq!(
            placer.place_grass(coordinate, bounds(), &field, 1.0),
            placer.place_grass(coordinate, bounds(), &field, 1.0)
        );
    }
}
