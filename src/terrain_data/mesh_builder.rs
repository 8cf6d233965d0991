use crate::{
    error::TerrainError,
    math::{HeightField, NodeBounds},
};
use bevy::{
    math::{DVec2, DVec3, Vec3},
    render::{
        mesh::{Indices, Mesh, PrimitiveTopology},
        render_asset::RenderAssetUsages,
    },
};
use itertools::iproduct;

/// The world coordinate of grid line `index` between `min` and `max`.
///
/// The last line is pinned to `max`, so neighbouring grids sample their shared edge
/// at bitwise identical coordinates.
#[inline]
fn grid_line(min: f64, max: f64, step: f64, index: u32, last: u32) -> f64 {
    if index == last {
        max
    } else {
        min + index as f64 * step
    }
}

/// Rotates a world frame vector (`z` up) by -90° around the x axis into the render frame (`y` up).
#[inline]
fn to_render_frame(vector: DVec3) -> Vec3 {
    Vec3::new(vector.x as f32, vector.z as f32, -vector.y as f32)
}

/// CPU side mesh data of a terrain grid.
///
/// Positions are relative to the grid center and already rotated into the render frame,
/// where the world plane `(x, y)` lies horizontal as `(x, -z)` and heights point along `y`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    /// The number of vertices along each side of the grid.
    pub resolution: u32,
}

impl GridMesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// The height of the vertex in row `row` and column `column`.
    pub fn height(&self, column: u32, row: u32) -> f32 {
        self.positions[(row * self.resolution + column) as usize][1]
    }
}

impl From<GridMesh> for Mesh {
    fn from(grid: GridMesh) -> Self {
        Mesh::new(
            PrimitiveTopology::TriangleList,
            RenderAssetUsages::default(),
        )
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, grid.positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, grid.normals)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, grid.uvs)
        .with_inserted_indices(Indices::U32(grid.indices))
    }
}

/// Builds the renderable grid of a node from the height field.
///
/// Implementations have to be pure with respect to the height field, because grids of
/// multiple nodes may be built concurrently on worker threads.
pub trait MeshBuilder: Send + Sync {
    fn build_grid(
        &self,
        bounds: &NodeBounds,
        resolution: u32,
        field: &HeightField,
    ) -> Result<GridMesh, TerrainError>;
}

/// The default [`MeshBuilder`], which samples a regular grid.
#[derive(Clone, Copy, Debug)]
pub struct GridMeshBuilder {
    /// The vertical scale applied to the sampled elevation.
    pub height_factor: f32,
}

impl Default for GridMeshBuilder {
    fn default() -> Self {
        Self { height_factor: 1.0 }
    }
}

impl MeshBuilder for GridMeshBuilder {
    fn build_grid(
        &self,
        bounds: &NodeBounds,
        resolution: u32,
        field: &HeightField,
    ) -> Result<GridMesh, TerrainError> {
        let size = bounds.size();

        if resolution < 2 {
            return Err(TerrainError::invalid_parameter(
                "resolution",
                format!("a grid needs at least 2 vertices per side, got {resolution}"),
            ));
        }
        if !(size > 0.0 && size.is_finite() && bounds.height() > 0.0) {
            return Err(TerrainError::invalid_parameter(
                "size",
                format!("expected a positive grid size, got {size}"),
            ));
        }

        let last = resolution - 1;
        let step = DVec2::new(size, bounds.height()) / last as f64;
        let center = bounds.center();
        let height_factor = self.height_factor as f64;

        let vertex_count = (resolution * resolution) as usize;
        let mut positions = Vec::with_capacity(vertex_count);
        let mut normals = Vec::with_capacity(vertex_count);
        let mut uvs = Vec::with_capacity(vertex_count);

        for (row, column) in iproduct!(0..resolution, 0..resolution) {
            let world = DVec2::new(
                grid_line(bounds.min.x, bounds.max.x, step.x, column, last),
                grid_line(bounds.min.y, bounds.max.y, step.y, row, last),
            );
            let local = world - center;
            let height = field.elevation(world.x, world.y) * height_factor;
            let normal = field.normal(world.x, world.y, 0.5 * step.x, height_factor);

            // the grid is sampled in the world plane and then laid down horizontally
            let position = to_render_frame(DVec3::new(local.x, local.y, height));

            positions.push(position.to_array());
            normals.push(to_render_frame(normal).normalize().to_array());
            uvs.push([column as f32 / last as f32, row as f32 / last as f32]);
        }

        let mut indices = Vec::with_capacity((last * last * 6) as usize);

        for (row, column) in iproduct!(0..last, 0..last) {
            let lower_left = row * resolution + column;
            let lower_right = lower_left + 1;
            let upper_left = lower_left + resolution;
            let upper_right = upper_left + 1;

            // counter clockwise when viewed from above
            indices.extend_from_slice(&[
                lower_left,
                lower_right,
                upper_left,
                upper_left,
                lower_right,
                upper_right,
            ]);
        }

        Ok(GridMesh {
            positions,
            normals,
            uvs,
            indices,
            resolution,
        })
    }
}
