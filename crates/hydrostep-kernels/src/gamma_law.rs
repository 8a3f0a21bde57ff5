//! Gamma-law gas dynamics with first-order Rusanov fluxes.
//!
//! A deliberately simple kernel set: ideal-gas EOS, piecewise-constant
//! reconstruction and the local Lax-Friedrichs (Rusanov) flux. Species
//! are carried as partial densities and fluxed with the same dissipation
//! as the mass, so uniform mass fractions stay uniform.
//!
//! Constructed via the builder pattern: [`GammaLawHydro::builder`].

use hydrostep_core::{KernelError, StateLayout, UEDEN, UEINT, UFS, UMX, URHO, UTEMP};
use hydrostep_kernel::{HydroKernels, KernelContext};
use hydrostep_state::Block;

/// Primitive density.
pub const QRHO: usize = 0;
/// Primitive velocity.
pub const QU: usize = 1;
/// Primitive pressure.
pub const QPRES: usize = 2;
/// Sound speed.
pub const QC: usize = 3;
/// First species mass fraction.
pub const QFS: usize = 4;

/// Ideal-gas hydrodynamics kernels.
///
/// Each step computes, per face,
/// ```text
/// F = (F(U_L) + F(U_R)) / 2 - s_max (U_R - U_L) / 2,   s_max = max(|u| + c)
/// ```
/// and the divergence `k_i = -(F_{i+1/2} - F_{i-1/2}) / dx`.
///
/// ```
/// use hydrostep_kernels::GammaLawHydro;
/// use hydrostep_kernel::HydroKernels;
///
/// let hydro = GammaLawHydro::builder()
///     .gamma(1.4)
///     .nspec(2)
///     .build()
///     .unwrap();
/// assert_eq!(hydro.layout().ncomp(), 7);
/// ```
#[derive(Clone, Debug)]
pub struct GammaLawHydro {
    gamma: f64,
    r_gas: f64,
    nspec: usize,
    small_dens: f64,
    small_temp: f64,
    small_pres: f64,
    small_x: f64,
    burn_rate: f64,
    burn_energy: f64,
}

/// Builder for [`GammaLawHydro`].
///
/// Defaults: `gamma = 1.4`, unit gas constant, one species, density floor
/// `1e-10`, temperature floor `1e-8`, no burn.
pub struct GammaLawHydroBuilder {
    gamma: f64,
    r_gas: f64,
    nspec: usize,
    small_dens: f64,
    small_temp: f64,
    small_x: f64,
    burn_rate: f64,
    burn_energy: f64,
}

impl GammaLawHydro {
    /// Create a new builder.
    pub fn builder() -> GammaLawHydroBuilder {
        GammaLawHydroBuilder {
            gamma: 1.4,
            r_gas: 1.0,
            nspec: 1,
            small_dens: 1.0e-10,
            small_temp: 1.0e-8,
            small_x: 1.0e-30,
            burn_rate: 0.0,
            burn_energy: 0.0,
        }
    }

    /// Ratio of specific heats.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Density floor.
    pub fn small_dens(&self) -> f64 {
        self.small_dens
    }

    /// Temperature floor.
    pub fn small_temp(&self) -> f64 {
        self.small_temp
    }

    /// Fill a conserved cell from density, velocity, pressure and mass
    /// fractions. Missing mass fractions are zero; an empty slice puts
    /// all mass in species 0.
    pub fn conserved(&self, rho: f64, u: f64, p: f64, xs: &[f64], cell: &mut [f64]) {
        let rho_e = p / (self.gamma - 1.0);
        cell[URHO] = rho;
        cell[UMX] = rho * u;
        cell[UEINT] = rho_e;
        cell[UEDEN] = rho_e + 0.5 * rho * u * u;
        cell[UTEMP] = self.temperature_of(rho_e / rho);
        for n in 0..self.nspec {
            let x = match xs.get(n) {
                Some(&x) => x,
                None if xs.is_empty() && n == 0 => 1.0,
                None => 0.0,
            };
            cell[UFS + n] = rho * x;
        }
    }

    /// Pressure of a conserved cell.
    pub fn pressure(&self, cell: &[f64]) -> f64 {
        let rho = cell[URHO].max(self.small_dens);
        (self.gamma - 1.0) * rho * self.specific_energy(cell, rho)
    }

    fn temperature_of(&self, e: f64) -> f64 {
        ((self.gamma - 1.0) * e / self.r_gas).max(self.small_temp)
    }

    fn energy_of(&self, temp: f64) -> f64 {
        temp * self.r_gas / (self.gamma - 1.0)
    }

    /// Specific internal energy, from the total energy when it is
    /// positive after removing kinetic energy, else from `rho e`.
    fn specific_energy(&self, cell: &[f64], rho: f64) -> f64 {
        let u = cell[UMX] / rho;
        let e_tot = (cell[UEDEN] - 0.5 * rho * u * u) / rho;
        let e = if e_tot > 0.0 { e_tot } else { cell[UEINT] / rho };
        e.max(self.energy_of(self.small_temp))
    }

    fn primitive_cell(&self, u_cell: &[f64], q: &mut [f64]) {
        let rho = u_cell[URHO].max(self.small_dens);
        let vel = u_cell[UMX] / rho;
        let e = self.specific_energy(u_cell, rho);
        let p = (self.gamma - 1.0) * rho * e;
        q[QRHO] = rho;
        q[QU] = vel;
        q[QPRES] = p;
        q[QC] = (self.gamma * p / rho).sqrt();
        for n in 0..self.nspec {
            q[QFS + n] = u_cell[UFS + n] / rho;
        }
    }

    fn physical_flux(&self, u_cell: &[f64], q: &[f64], flux: &mut [f64]) {
        let vel = q[QU];
        let p = q[QPRES];
        flux[URHO] = u_cell[URHO] * vel;
        flux[UMX] = u_cell[UMX] * vel + p;
        flux[UEDEN] = (u_cell[UEDEN] + p) * vel;
        flux[UEINT] = u_cell[UEINT] * vel;
        flux[UTEMP] = 0.0;
        for n in 0..self.nspec {
            flux[UFS + n] = u_cell[UFS + n] * vel;
        }
    }

    fn floor_cell(&self, cell: &mut [f64]) {
        let rho_old = cell[URHO];
        let rho = self.small_dens;
        let species_total: f64 = (0..self.nspec).map(|n| cell[UFS + n].max(0.0)).sum();
        for n in 0..self.nspec {
            cell[UFS + n] = if species_total > 0.0 && rho_old > 0.0 {
                rho * cell[UFS + n].max(0.0) / species_total
            } else {
                rho / self.nspec as f64
            };
        }
        let rho_e = rho * self.energy_of(self.small_temp);
        cell[URHO] = rho;
        cell[UMX] = 0.0;
        cell[UEINT] = rho_e;
        cell[UEDEN] = rho_e;
        cell[UTEMP] = self.small_temp;
    }
}

impl GammaLawHydroBuilder {
    /// Ratio of specific heats. Must exceed 1.
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Specific gas constant used by the temperature closure.
    pub fn gas_constant(mut self, r_gas: f64) -> Self {
        self.r_gas = r_gas;
        self
    }

    /// Number of advected species.
    pub fn nspec(mut self, nspec: usize) -> Self {
        self.nspec = nspec;
        self
    }

    /// Density floor.
    pub fn small_dens(mut self, small_dens: f64) -> Self {
        self.small_dens = small_dens;
        self
    }

    /// Temperature floor.
    pub fn small_temp(mut self, small_temp: f64) -> Self {
        self.small_temp = small_temp;
        self
    }

    /// Burn species 0 into species 1 at `rate`, releasing `energy` per
    /// unit burned mass. Requires at least two species.
    pub fn burn(mut self, rate: f64, energy: f64) -> Self {
        self.burn_rate = rate;
        self.burn_energy = energy;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<GammaLawHydro, String> {
        if !(self.gamma > 1.0) || !self.gamma.is_finite() {
            return Err(format!("gamma must be finite and > 1, got {}", self.gamma));
        }
        if !(self.r_gas > 0.0) || !self.r_gas.is_finite() {
            return Err(format!(
                "gas constant must be finite and > 0, got {}",
                self.r_gas
            ));
        }
        if !(self.small_dens > 0.0) || !(self.small_temp > 0.0) {
            return Err(format!(
                "floors must be > 0, got small_dens = {}, small_temp = {}",
                self.small_dens, self.small_temp
            ));
        }
        if !(self.burn_rate >= 0.0) || !self.burn_rate.is_finite() {
            return Err(format!(
                "burn rate must be finite and >= 0, got {}",
                self.burn_rate
            ));
        }
        if self.burn_rate > 0.0 && self.nspec < 2 {
            return Err(format!(
                "burning needs at least 2 species, got {}",
                self.nspec
            ));
        }
        let small_pres = self.small_dens * self.small_temp * self.r_gas;
        Ok(GammaLawHydro {
            gamma: self.gamma,
            r_gas: self.r_gas,
            nspec: self.nspec,
            small_dens: self.small_dens,
            small_temp: self.small_temp,
            small_pres,
            small_x: self.small_x,
            burn_rate: self.burn_rate,
            burn_energy: self.burn_energy,
        })
    }
}

impl HydroKernels for GammaLawHydro {
    fn name(&self) -> &str {
        "gamma_law"
    }

    fn layout(&self) -> StateLayout {
        StateLayout::new(self.nspec)
    }

    fn ghost_width(&self) -> usize {
        1
    }

    fn nprim(&self) -> usize {
        QFS + self.nspec
    }

    /// First half of a Strang-split burn: species 0 decays into species 1
    /// over `dt / 2`, depositing the released energy.
    fn burn(&self, ctx: &KernelContext, state: &mut Block) -> Result<(), KernelError> {
        if self.burn_rate == 0.0 {
            return Ok(());
        }
        let burned_fraction = 1.0 - (-self.burn_rate * 0.5 * ctx.dt()).exp();
        let g = state.ghost() as isize;
        for i in -g..state.len() as isize + g {
            let cell = state.cell_mut(i);
            let burned = cell[UFS].max(0.0) * burned_fraction;
            cell[UFS] -= burned;
            cell[UFS + 1] += burned;
            let released = burned * self.burn_energy;
            cell[UEDEN] += released;
            cell[UEINT] += released;
        }
        Ok(())
    }

    fn primitives(
        &self,
        _ctx: &KernelContext,
        state: &Block,
        q: &mut Block,
    ) -> Result<(), KernelError> {
        let g = state.ghost() as isize;
        for i in -g..state.len() as isize + g {
            self.primitive_cell(state.cell(i), q.cell_mut(i));
            if q.cell(i)[QPRES] < self.small_pres {
                q.cell_mut(i)[QPRES] = self.small_pres;
            }
        }
        Ok(())
    }

    fn flux_divergence(
        &self,
        ctx: &KernelContext,
        state: &Block,
        q: &Block,
        divergence: &mut Block,
        face_flux: &mut [f64],
    ) -> Result<(), KernelError> {
        if state.ghost() < 1 {
            return Err(KernelError::ExecutionFailed {
                reason: format!("flux needs 1 ghost cell, block has {}", state.ghost()),
            });
        }
        let ncomp = state.ncomp();
        let len = state.len();
        if face_flux.len() != (len + 1) * ncomp {
            return Err(KernelError::ExecutionFailed {
                reason: format!(
                    "face flux buffer holds {} values, need {}",
                    face_flux.len(),
                    (len + 1) * ncomp
                ),
            });
        }

        let mut f_l = vec![0.0; ncomp];
        let mut f_r = vec![0.0; ncomp];
        for f in 0..=len {
            let il = f as isize - 1;
            let ir = f as isize;
            let (ul, ur) = (state.cell(il), state.cell(ir));
            let (ql, qr) = (q.cell(il), q.cell(ir));
            self.physical_flux(ul, ql, &mut f_l);
            self.physical_flux(ur, qr, &mut f_r);
            let s_max = (ql[QU].abs() + ql[QC]).max(qr[QU].abs() + qr[QC]);
            let out = &mut face_flux[f * ncomp..(f + 1) * ncomp];
            for c in 0..ncomp {
                out[c] = if c == UTEMP {
                    0.0
                } else {
                    0.5 * (f_l[c] + f_r[c]) - 0.5 * s_max * (ur[c] - ul[c])
                };
            }
        }

        let dx = ctx.dx();
        for (i, cell) in divergence.interior_cells_mut().enumerate() {
            for c in 0..ncomp {
                cell[c] = -(face_flux[(i + 1) * ncomp + c] - face_flux[i * ncomp + c]) / dx;
            }
        }
        Ok(())
    }

    fn enforce_density_floor(
        &self,
        _ctx: &KernelContext,
        state: &mut Block,
        reference: Option<&Block>,
    ) -> f64 {
        let mut frac_change = 1.0_f64;
        for i in 0..state.len() as isize {
            let rho = state.cell(i)[URHO];
            if rho >= self.small_dens {
                continue;
            }
            if let Some(r) = reference {
                let rho_ref = r.cell(i)[URHO];
                if rho_ref > 0.0 {
                    frac_change = frac_change.min((rho - rho_ref) / rho_ref);
                }
            }
            self.floor_cell(state.cell_mut(i));
        }
        frac_change
    }

    fn normalize_species(&self, _ctx: &KernelContext, state: &mut Block) {
        if self.nspec == 0 {
            return;
        }
        for cell in state.interior_cells_mut() {
            let rho = cell[URHO];
            let mut sum = 0.0;
            for n in 0..self.nspec {
                let x = (cell[UFS + n] / rho).clamp(self.small_x, 1.0);
                cell[UFS + n] = x;
                sum += x;
            }
            for n in 0..self.nspec {
                cell[UFS + n] = rho * cell[UFS + n] / sum;
            }
        }
    }

    fn reset_internal_energy(&self, _ctx: &KernelContext, state: &mut Block) {
        let e_min = self.energy_of(self.small_temp);
        for cell in state.interior_cells_mut() {
            let rho = cell[URHO];
            let ke = 0.5 * cell[UMX] * cell[UMX] / rho;
            let rho_e = cell[UEDEN] - ke;
            if rho_e > rho * e_min {
                cell[UEINT] = rho_e;
            } else {
                cell[UEINT] = cell[UEINT].max(rho * e_min);
                cell[UEDEN] = cell[UEINT] + ke;
            }
        }
    }

    fn compute_temperature(
        &self,
        _ctx: &KernelContext,
        state: &mut Block,
    ) -> Result<(), KernelError> {
        let lo = state.lo();
        for (i, cell) in state.interior_cells_mut().enumerate() {
            let rho = cell[URHO];
            if !(rho > 0.0) {
                return Err(KernelError::EosFailed {
                    cell: lo + i,
                    density: rho,
                    energy: cell[UEINT],
                });
            }
            cell[UTEMP] = self.temperature_of(cell[UEINT] / rho);
        }
        Ok(())
    }

    fn stable_dt(&self, ctx: &KernelContext, state: &Block) -> Result<f64, KernelError> {
        let mut q = vec![0.0; self.nprim()];
        let mut tau = f64::INFINITY;
        for cell in state.interior_cells() {
            self.primitive_cell(cell, &mut q);
            tau = tau.min(ctx.dx() / (q[QU].abs() + q[QC]));
        }
        Ok(tau)
    }
}
