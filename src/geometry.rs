use std::f32::consts::PI;

/// Tessellation parameters for a UV sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereParams {
    pub radius: f32,
    /// Longitudinal divisions around the equator.
    pub segments: u32,
    /// Latitudinal divisions from pole to pole.
    pub rings: u32,
}

impl Default for SphereParams {
    /// Unit radius, 32 segments, 16 rings: 561 vertices, 960 triangles.
    ///
    /// Rings span 180 degrees and segments 360, so this grid has the same
    /// angular step in both directions, unlike an equal 32 x 32 subdivision.
    fn default() -> Self {
        Self {
            radius: 1.0,
            segments: 32,
            rings: 16,
        }
    }
}

/// Host-side sphere geometry ready to be uploaded as a mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SphereGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub cells: Vec<[u32; 3]>,
}

/// Builds the default sphere: radius 1, 32 segments, 16 rings.
pub fn uv_sphere() -> SphereGeometry {
    SphereGeometry::uv(SphereParams::default())
}

impl SphereGeometry {
    /// Generates a latitude/longitude sphere centered at the origin.
    ///
    /// The seam column is duplicated so every ring has `segments + 1`
    /// vertices. Triangles that would collapse onto a pole are skipped, and
    /// the remaining ones wind counter-clockwise when seen from outside.
    pub fn uv(params: SphereParams) -> Self {
        let segments = params.segments.max(3);
        let rings = params.rings.max(2);
        let columns = segments + 1;

        let vertex_count = (columns * (rings + 1)) as usize;
        let mut positions = Vec::with_capacity(vertex_count);
        let mut normals = Vec::with_capacity(vertex_count);

        for ring in 0..=rings {
            let phi = PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * PI * seg as f32 / segments as f32;
                let normal = [ring_radius * theta.cos(), y, ring_radius * theta.sin()];
                positions.push(normal.map(|c| c * params.radius));
                normals.push(normal);
            }
        }

        let mut cells = Vec::with_capacity((segments * (rings - 1) * 2) as usize);
        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * columns + seg;
                let below = current + columns;

                if ring != 0 {
                    cells.push([current, current + 1, below]);
                }
                if ring != rings - 1 {
                    cells.push([current + 1, below + 1, below]);
                }
            }
        }

        Self {
            positions,
            normals,
            cells,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.cells.len()
    }

    /// Flat index list, three entries per triangle.
    pub fn indices(&self) -> &[u32] {
        self.cells.as_flattened()
    }
}
