//! Geometric/elastic coupling coefficients at fault split nodes.
//!
//! Built once from the grid metric and the material model, then read-only
//! for the whole run. Every matrix is stored per node so the friction-law
//! update can stay a flat data-parallel sweep.

use super::{FaultGridLayout, NUM_SIDES};
use crate::error::{Result, TemblorError};

pub type Mat3 = [[f32; 3]; 3];

pub fn mat3_vec(m: &Mat3, v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn mat3_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Elastic moduli and density on one side of a split node.
#[derive(Debug, Clone, Copy)]
pub struct SplitNodeMaterial {
    pub rho: f32,
    pub lam: f32,
    pub mu: f32,
}

impl SplitNodeMaterial {
    pub fn cp(&self) -> f32 {
        ((self.lam + 2.0 * self.mu) / self.rho).sqrt()
    }

    pub fn cs(&self) -> f32 {
        (self.mu / self.rho).sqrt()
    }

    /// Shear impedance (rho * cs), the radiation-damping coefficient of the
    /// split-node traction/velocity coupling.
    pub fn shear_impedance(&self) -> f32 {
        self.rho * self.cs()
    }
}

/// Local fault frame at one split node: unit normal, strike, and dip.
#[derive(Debug, Clone, Copy)]
pub struct FaultNodeGeometry {
    pub normal: [f32; 3],
    pub strike: [f32; 3],
    pub dip: [f32; 3],
}

impl FaultNodeGeometry {
    /// Basis matrix with the frame vectors as rows (global -> local).
    fn basis(&self) -> Mat3 {
        [self.normal, self.strike, self.dip]
    }
}

/// Per-plane coupling coefficient bundle.
pub struct FaultCoef {
    pub layout: FaultGridLayout,
    /// Traction -> velocity-jump coupling per side, scaled by the side's
    /// shear impedance; the P-wave impedance weights the normal component.
    pub traction_to_vel: [Vec<Mat3>; 2],
    /// Projects plus-side motion through the local fault frame onto the
    /// minus side.
    pub plus_to_minus: Vec<Mat3>,
    /// Traction-free mirror projector used where the plane meets the free
    /// surface.
    pub free_surface: [Vec<Mat3>; 2],
    /// Split-node media.
    pub rho: [Vec<f32>; 2],
    pub lam: [Vec<f32>; 2],
    pub mu: [Vec<f32>; 2],
    /// Shear impedance per side, consumed by the friction-law update.
    pub impedance: [Vec<f32>; 2],
    pub normal: Vec<[f32; 3]>,
    pub strike: Vec<[f32; 3]>,
    pub dip: Vec<[f32; 3]>,
}

impl FaultCoef {
    /// Assemble the bundle from per-node geometry and per-side material.
    ///
    /// All slices must cover the full padded plane (`layout.siz_slice`
    /// nodes); ghost nodes carry coefficients too so exchanged state can be
    /// consumed without re-indexing.
    pub fn build(
        layout: FaultGridLayout,
        geometry: &[FaultNodeGeometry],
        material: [&[SplitNodeMaterial]; NUM_SIDES],
    ) -> Result<Self> {
        let n = layout.siz_slice;
        if geometry.len() != n {
            return Err(TemblorError::Config(format!(
                "fault geometry covers {} nodes, layout has {n}",
                geometry.len()
            )));
        }
        for (side, m) in material.iter().enumerate() {
            if m.len() != n {
                return Err(TemblorError::Config(format!(
                    "fault material side {side} covers {} nodes, layout has {n}",
                    m.len()
                )));
            }
        }

        let mut coef = Self {
            layout,
            traction_to_vel: [Vec::with_capacity(n), Vec::with_capacity(n)],
            plus_to_minus: Vec::with_capacity(n),
            free_surface: [Vec::with_capacity(n), Vec::with_capacity(n)],
            rho: [Vec::with_capacity(n), Vec::with_capacity(n)],
            lam: [Vec::with_capacity(n), Vec::with_capacity(n)],
            mu: [Vec::with_capacity(n), Vec::with_capacity(n)],
            impedance: [Vec::with_capacity(n), Vec::with_capacity(n)],
            normal: Vec::with_capacity(n),
            strike: Vec::with_capacity(n),
            dip: Vec::with_capacity(n),
        };

        for (node, geo) in geometry.iter().enumerate() {
            let nv = geo.normal;
            coef.normal.push(nv);
            coef.strike.push(geo.strike);
            coef.dip.push(geo.dip);

            for side in 0..NUM_SIDES {
                let mat = material[side][node];
                if mat.rho <= 0.0 || mat.mu <= 0.0 {
                    return Err(TemblorError::Config(format!(
                        "non-positive media at fault node {node} side {side}"
                    )));
                }
                let zs = mat.shear_impedance();
                let zp = mat.rho * mat.cp();

                // Shear components couple through 1/zs; the normal component
                // through 1/zp. t2v = (1/zs) * (I + (zs/zp - 1) n (x) n).
                let mut t2v = [[0.0; 3]; 3];
                let ratio = zs / zp - 1.0;
                for (i, row) in t2v.iter_mut().enumerate() {
                    for (j, v) in row.iter_mut().enumerate() {
                        let ident = if i == j { 1.0 } else { 0.0 };
                        *v = (ident + ratio * nv[i] * nv[j]) / zs;
                    }
                }
                coef.traction_to_vel[side].push(t2v);

                // Free-surface mirror: reverses the normal component so the
                // image field cancels normal traction at the surface.
                let mut mirror = [[0.0; 3]; 3];
                for (i, row) in mirror.iter_mut().enumerate() {
                    for (j, v) in row.iter_mut().enumerate() {
                        let ident = if i == j { 1.0 } else { 0.0 };
                        *v = ident - 2.0 * nv[i] * nv[j];
                    }
                }
                coef.free_surface[side].push(mirror);

                coef.rho[side].push(mat.rho);
                coef.lam[side].push(mat.lam);
                coef.mu[side].push(mat.mu);
                coef.impedance[side].push(zs);
            }

            // Through-the-frame projection: global -> local on the plus side,
            // back to global on the minus side. Identity when both sides see
            // the same frame, but kept per node for warped metrics.
            let b = geo.basis();
            let bt = [
                [b[0][0], b[1][0], b[2][0]],
                [b[0][1], b[1][1], b[2][1]],
                [b[0][2], b[1][2], b[2][2]],
            ];
            coef.plus_to_minus.push(mat3_mul(&bt, &b));
        }
        Ok(coef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn flat_geometry(n: usize) -> Vec<FaultNodeGeometry> {
        vec![
            FaultNodeGeometry {
                normal: [1.0, 0.0, 0.0],
                strike: [0.0, 1.0, 0.0],
                dip: [0.0, 0.0, 1.0],
            };
            n
        ]
    }

    fn granite(n: usize) -> Vec<SplitNodeMaterial> {
        vec![
            SplitNodeMaterial {
                rho: 2670.0,
                lam: 3.2e10,
                mu: 3.2e10,
            };
            n
        ]
    }

    fn build_flat() -> FaultCoef {
        let layout = FaultGridLayout::new(2, 2, 1).unwrap();
        let geo = flat_geometry(layout.siz_slice);
        let mat = granite(layout.siz_slice);
        FaultCoef::build(layout, &geo, [&mat, &mat]).unwrap()
    }

    #[test]
    fn shear_traction_couples_through_shear_impedance() {
        let coef = build_flat();
        let mat = granite(1)[0];
        // Strike-parallel unit traction on an x-normal plane.
        let v = mat3_vec(&coef.traction_to_vel[0][0], [0.0, 1.0, 0.0]);
        assert_abs_diff_eq!(v[1], 1.0 / mat.shear_impedance(), epsilon = 1e-12);
        assert_abs_diff_eq!(v[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn normal_traction_couples_through_p_impedance() {
        let coef = build_flat();
        let mat = granite(1)[0];
        let v = mat3_vec(&coef.traction_to_vel[1][0], [1.0, 0.0, 0.0]);
        assert_abs_diff_eq!(v[0], 1.0 / (mat.rho * mat.cp()), epsilon = 1e-12);
    }

    #[test]
    fn plus_to_minus_is_identity_for_shared_frame() {
        let coef = build_flat();
        let m = &coef.plus_to_minus[0];
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(m[i][j], expect, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn free_surface_mirror_reverses_normal_motion() {
        let coef = build_flat();
        let v = mat3_vec(&coef.free_surface[0][0], [1.0, 0.5, 0.0]);
        assert_abs_diff_eq!(v[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn wrong_node_count_rejected() {
        let layout = FaultGridLayout::new(2, 2, 1).unwrap();
        let geo = flat_geometry(3);
        let mat = granite(layout.siz_slice);
        assert!(FaultCoef::build(layout, &geo, [&mat, &mat]).is_err());
    }
}
