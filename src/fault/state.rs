//! Dynamic-rupture state of one fault plane segment.
//!
//! Carries the prescribed initial stress and friction parameters, the
//! evolving traction/slip/slip-rate fields, and the per-node rupture flags.
//! The friction law is linear slip-weakening; rupture flags only ever
//! latch on, they never revert.

use super::coef::FaultCoef;
use super::{FaultGridLayout, MINUS_SIDE, PLUS_SIDE};
use crate::error::{Result, TemblorError};

/// Variables published to neighbors and output writers, in pool order.
pub const NUM_FAULT_OUTPUT_VARS: usize = 9;
pub const FAULT_OUTPUT_VAR_NAMES: [&str; NUM_FAULT_OUTPUT_VARS] = [
    "Tn", "Ts1", "Ts2", "Slip", "Slip1", "Slip2", "Vs", "Vs1", "Vs2",
];

/// Classification of one fault node, derived from the latched flags and the
/// instantaneous slip rate. Purely diagnostic: the friction update reads the
/// flags, never this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuptureState {
    /// Shear traction well below strength, never ruptured.
    Locked,
    /// Approaching failure: shear traction above the nucleation fraction of
    /// strength but not yet slipping.
    Nucleating,
    /// Actively slipping.
    Rupturing,
    /// Ruptured in the past, slip rate has dropped below the healing
    /// threshold. Strength stays at the dynamic level.
    Healed,
}

/// Fraction of static strength above which an unruptured node counts as
/// nucleating.
const NUCLEATION_FRACTION: f32 = 0.9;

/// Slip rate below which a ruptured node is reported as healed.
const HEAL_RATE: f32 = 1e-3;

/// Per-node prescribed parameters of the slip-weakening law.
#[derive(Debug, Clone, Copy)]
pub struct FrictionParams {
    /// Initial tractions in the fault frame (normal, strike, dip).
    /// Compression is negative normal traction.
    pub t0n: f32,
    pub t0s1: f32,
    pub t0s2: f32,
    /// Static and dynamic friction coefficients.
    pub mu_s: f32,
    pub mu_d: f32,
    /// Critical slip-weakening distance.
    pub dc: f32,
    /// Frictional cohesion.
    pub c0: f32,
}

/// Evolving rupture state of one plane segment.
///
/// All per-node arrays span the full padded plane; ghost nodes are filled
/// by exchange and read by the stencil, but the friction update sweeps
/// interior nodes only.
pub struct FaultPlane {
    pub layout: FaultGridLayout,

    // Prescribed fields.
    pub t0n: Vec<f32>,
    pub t0s1: Vec<f32>,
    pub t0s2: Vec<f32>,
    pub mu_s: Vec<f32>,
    pub mu_d: Vec<f32>,
    pub dc: Vec<f32>,
    pub c0: Vec<f32>,
    /// Radiation-damping viscosity relating excess traction to slip rate.
    pub eta: Vec<f32>,

    // Evolving fields, perturbations relative to the prescribed tractions.
    pub tn: Vec<f32>,
    pub ts1: Vec<f32>,
    pub ts2: Vec<f32>,
    pub slip: Vec<f32>,
    pub slip1: Vec<f32>,
    pub slip2: Vec<f32>,
    pub vs: Vec<f32>,
    pub vs1: Vec<f32>,
    pub vs2: Vec<f32>,
    pub peak_vs: Vec<f32>,
    /// First-rupture time per node; infinity until the node ruptures.
    pub init_t0: Vec<f32>,

    // Latched flags.
    pub flag_rup: Vec<bool>,
    /// Set once slip passes `dc`; friction stays at the dynamic level.
    pub united: Vec<bool>,
    /// Nodes the rupture is allowed to touch. Nodes outside stay welded.
    pub faultgrid: Vec<bool>,
}

impl FaultPlane {
    /// Build a plane with uniform friction parameters. The whole padded
    /// plane is rupturable; use [`Self::weld`] to pin barrier regions.
    pub fn uniform(layout: FaultGridLayout, params: FrictionParams, eta: f32) -> Result<Self> {
        if params.dc <= 0.0 {
            return Err(TemblorError::Config(format!(
                "slip-weakening distance must be positive, got {}",
                params.dc
            )));
        }
        if params.mu_d > params.mu_s {
            return Err(TemblorError::Config(format!(
                "dynamic friction {} exceeds static friction {}",
                params.mu_d, params.mu_s
            )));
        }
        if eta <= 0.0 {
            return Err(TemblorError::Config(format!(
                "radiation-damping viscosity must be positive, got {eta}"
            )));
        }
        let n = layout.siz_slice;
        Ok(Self {
            layout,
            t0n: vec![params.t0n; n],
            t0s1: vec![params.t0s1; n],
            t0s2: vec![params.t0s2; n],
            mu_s: vec![params.mu_s; n],
            mu_d: vec![params.mu_d; n],
            dc: vec![params.dc; n],
            c0: vec![params.c0; n],
            eta: vec![eta; n],
            tn: vec![0.0; n],
            ts1: vec![0.0; n],
            ts2: vec![0.0; n],
            slip: vec![0.0; n],
            slip1: vec![0.0; n],
            slip2: vec![0.0; n],
            vs: vec![0.0; n],
            vs1: vec![0.0; n],
            vs2: vec![0.0; n],
            peak_vs: vec![0.0; n],
            init_t0: vec![f32::INFINITY; n],
            flag_rup: vec![false; n],
            united: vec![false; n],
            faultgrid: vec![true; n],
        })
    }

    /// Build from per-side material via the coefficient bundle: eta is the
    /// harmonic combination of the two shear impedances.
    pub fn from_coef(coef: &FaultCoef, params: FrictionParams) -> Result<Self> {
        let mut plane = Self::uniform(coef.layout, params, 1.0)?;
        for (node, eta) in plane.eta.iter_mut().enumerate() {
            let zm = coef.impedance[MINUS_SIDE][node];
            let zp = coef.impedance[PLUS_SIDE][node];
            *eta = zm * zp / (zm + zp);
        }
        Ok(plane)
    }

    /// Mark a padded-coordinate node as unrupturable.
    pub fn weld(&mut self, j: usize, k: usize) {
        let idx = self.layout.idx(j, k);
        self.faultgrid[idx] = false;
    }

    /// Current frictional strength of a node. Compression is the positive
    /// part of the negative total normal traction; tension gives cohesion
    /// only.
    pub fn strength(&self, node: usize) -> f32 {
        let compression = (-(self.t0n[node] + self.tn[node])).max(0.0);
        self.c0[node] + self.friction(node) * compression
    }

    /// Slip-weakening friction coefficient. Linear from static to dynamic
    /// over `dc`; pinned at dynamic once the node is united.
    fn friction(&self, node: usize) -> f32 {
        if self.united[node] {
            return self.mu_d[node];
        }
        let w = (self.slip[node] / self.dc[node]).min(1.0);
        self.mu_s[node] + (self.mu_d[node] - self.mu_s[node]) * w
    }

    /// Total shear traction magnitude at a node.
    pub fn shear_traction(&self, node: usize) -> f32 {
        let s1 = self.t0s1[node] + self.ts1[node];
        let s2 = self.t0s2[node] + self.ts2[node];
        s1.hypot(s2)
    }

    /// One friction-law sweep over the interior nodes.
    ///
    /// Where shear traction exceeds strength the excess drives slip through
    /// the radiation-damping viscosity and the traction is capped at
    /// strength; elsewhere the node sticks and the slip rate is zero. Flags
    /// latch on and `init_t0` records the first rupture time.
    pub fn friction_update(&mut self, dt: f32, time: f32) -> Result<()> {
        if dt <= 0.0 {
            return Err(TemblorError::Config(format!(
                "friction update needs a positive time step, got {dt}"
            )));
        }
        let h = self.layout.halo;
        for k in h..h + self.layout.nk {
            for j in h..h + self.layout.nj {
                let node = self.layout.idx(j, k);
                if !self.faultgrid[node] {
                    self.vs[node] = 0.0;
                    self.vs1[node] = 0.0;
                    self.vs2[node] = 0.0;
                    continue;
                }

                let tau = self.shear_traction(node);
                let strength = self.strength(node);

                if tau > strength && tau > 0.0 {
                    // Sliding: the excess over strength drives slip through
                    // the radiation-damping viscosity.
                    let rate = (tau - strength) / self.eta[node];
                    let s1 = self.t0s1[node] + self.ts1[node];
                    let s2 = self.t0s2[node] + self.ts2[node];

                    self.vs[node] = rate;
                    self.vs1[node] = rate * s1 / tau;
                    self.vs2[node] = rate * s2 / tau;
                    self.slip1[node] += self.vs1[node] * dt;
                    self.slip2[node] += self.vs2[node] * dt;
                    self.slip[node] += rate * dt;
                    if rate > self.peak_vs[node] {
                        self.peak_vs[node] = rate;
                    }

                    if !self.flag_rup[node] {
                        self.flag_rup[node] = true;
                        self.init_t0[node] = time;
                    }
                    if self.slip[node] >= self.dc[node] {
                        self.united[node] = true;
                    }

                    // Cap the traction at the strength the accumulated slip
                    // leaves the node with.
                    let scale = self.strength(node) / tau;
                    self.ts1[node] = s1 * scale - self.t0s1[node];
                    self.ts2[node] = s2 * scale - self.t0s2[node];
                } else {
                    self.vs[node] = 0.0;
                    self.vs1[node] = 0.0;
                    self.vs2[node] = 0.0;
                }
            }
        }
        Ok(())
    }

    /// Diagnostic classification of one node.
    pub fn state_of(&self, node: usize) -> RuptureState {
        if self.flag_rup[node] {
            if self.vs[node] > HEAL_RATE {
                RuptureState::Rupturing
            } else {
                RuptureState::Healed
            }
        } else if self.shear_traction(node) > NUCLEATION_FRACTION * self.strength(node) {
            RuptureState::Nucleating
        } else {
            RuptureState::Locked
        }
    }

    /// The published variables, in [`FAULT_OUTPUT_VAR_NAMES`] order.
    pub fn output_vars(&self) -> [&[f32]; NUM_FAULT_OUTPUT_VARS] {
        [
            &self.tn, &self.ts1, &self.ts2, &self.slip, &self.slip1, &self.slip2, &self.vs,
            &self.vs1, &self.vs2,
        ]
    }

    pub fn output_vars_mut(&mut self) -> [&mut [f32]; NUM_FAULT_OUTPUT_VARS] {
        [
            &mut self.tn,
            &mut self.ts1,
            &mut self.ts2,
            &mut self.slip,
            &mut self.slip1,
            &mut self.slip2,
            &mut self.vs,
            &mut self.vs1,
            &mut self.vs2,
        ]
    }

    pub fn check_finite(&self, rank: usize, step: usize, plane: usize) -> Result<()> {
        for (name, var) in FAULT_OUTPUT_VAR_NAMES.iter().zip(self.output_vars()) {
            if var.iter().any(|v| !v.is_finite()) {
                return Err(TemblorError::NonFinite {
                    what: format!("fault variable {name}"),
                    rank,
                    step,
                    plane: Some(plane),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn params() -> FrictionParams {
        FrictionParams {
            t0n: -120e6,
            t0s1: 70e6,
            t0s2: 0.0,
            mu_s: 0.677,
            mu_d: 0.525,
            dc: 0.4,
            c0: 0.0,
        }
    }

    fn small_plane() -> FaultPlane {
        let layout = FaultGridLayout::new(4, 4, 1).unwrap();
        FaultPlane::uniform(layout, params(), 4.6e6).unwrap()
    }

    #[test]
    fn locked_below_strength() {
        let plane = small_plane();
        let node = plane.layout.idx(1, 1);
        // 70 MPa shear against 0.677 * 120 MPa = 81.24 MPa strength.
        assert!(plane.shear_traction(node) < plane.strength(node));
        assert_eq!(plane.state_of(node), RuptureState::Locked);
    }

    #[test]
    fn near_failure_node_is_nucleating() {
        let mut plane = small_plane();
        let node = plane.layout.idx(1, 1);
        // Raise shear to 95% of static strength.
        plane.ts1[node] = 0.95 * plane.strength(node) - plane.t0s1[node];
        assert_eq!(plane.state_of(node), RuptureState::Nucleating);
    }

    #[test]
    fn overstress_triggers_rupture_and_caps_traction() {
        let mut plane = small_plane();
        let node = plane.layout.idx(1, 1);
        // Push shear past static strength everywhere.
        for v in plane.ts1.iter_mut() {
            *v = 20e6;
        }
        plane.friction_update(0.01, 0.05).unwrap();

        assert!(plane.flag_rup[node]);
        assert_eq!(plane.init_t0[node], 0.05);
        assert!(plane.vs[node] > 0.0);
        assert!(plane.slip[node] > 0.0);
        assert_eq!(plane.state_of(node), RuptureState::Rupturing);
        // Traction capped at current strength, to rounding of the rescale.
        assert_abs_diff_eq!(
            plane.shear_traction(node),
            plane.strength(node),
            epsilon = 100.0
        );
    }

    #[test]
    fn flags_never_revert() {
        let mut plane = small_plane();
        let node = plane.layout.idx(2, 2);
        for v in plane.ts1.iter_mut() {
            *v = 20e6;
        }
        plane.friction_update(0.01, 0.0).unwrap();
        assert!(plane.flag_rup[node]);
        let t0 = plane.init_t0[node];

        // Reverse the stress perturbation entirely; flags must hold.
        for v in plane.ts1.iter_mut() {
            *v = -60e6;
        }
        plane.friction_update(0.01, 0.02).unwrap();
        assert!(plane.flag_rup[node]);
        assert_eq!(plane.init_t0[node], t0);
        assert_eq!(plane.vs[node], 0.0);
        assert_eq!(plane.state_of(node), RuptureState::Healed);
    }

    #[test]
    fn strength_decays_to_dynamic_level() {
        let mut plane = small_plane();
        let node = plane.layout.idx(1, 1);
        let static_strength = plane.strength(node);
        for v in plane.ts1.iter_mut() {
            *v = 40e6;
        }
        // Enough steps to accumulate slip past dc.
        for step in 0..200 {
            plane.friction_update(0.01, step as f32 * 0.01).unwrap();
            // Keep driving.
            let s = plane.strength(node) - plane.t0s1[node] + 10e6;
            plane.ts1[node] = s;
        }
        assert!(plane.united[node]);
        let dynamic_strength = plane.strength(node);
        assert!(dynamic_strength < static_strength);
        assert_abs_diff_eq!(
            dynamic_strength,
            plane.mu_d[node] * 120e6,
            epsilon = 1e3
        );
    }

    #[test]
    fn welded_nodes_never_slip() {
        let mut plane = small_plane();
        plane.weld(1, 1);
        let node = plane.layout.idx(1, 1);
        for v in plane.ts1.iter_mut() {
            *v = 50e6;
        }
        plane.friction_update(0.01, 0.0).unwrap();
        assert!(!plane.flag_rup[node]);
        assert_eq!(plane.slip[node], 0.0);
    }

    #[test]
    fn non_finite_variable_names_itself() {
        let mut plane = small_plane();
        plane.vs1[3] = f32::NAN;
        let err = plane.check_finite(0, 9, 2).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Vs1"));
        assert!(msg.contains("fault plane 2"));
    }

    #[test]
    fn ghost_nodes_untouched_by_update() {
        let mut plane = small_plane();
        for v in plane.ts1.iter_mut() {
            *v = 20e6;
        }
        plane.friction_update(0.01, 0.0).unwrap();
        // Node (0, 0) is in the halo ring.
        let ghost = plane.layout.idx(0, 0);
        assert!(!plane.flag_rup[ghost]);
        assert_eq!(plane.slip[ghost], 0.0);
    }
}
