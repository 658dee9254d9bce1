//! Weighted moments of a density of states over an energy window.
//!
//! All integrals use the trapezoidal rule on the energy grid as given. Energies are expected to
//! be shifted so that the Fermi level sits at 0 eV.
use std::fmt;

use anyhow::ensure;
use serde::{
    Serialize,
    Deserialize,
};

use crate::types::{
    Result,
    Vector,
};


/// Integrated densities smaller than this are treated as an empty band.
const EPS: f64 = 1E-12;


/// Closed energy interval `[emin, emax]` in eV, relative to E-fermi.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyWindow {
    pub emin: f64,
    pub emax: f64,
}


impl EnergyWindow {
    /// Window for band center, skewness and kurtosis.
    pub const MOMENTS: EnergyWindow = EnergyWindow { emin: -15.0, emax: 15.0 };

    /// Window for band width, occupied states only.
    pub const OCCUPIED: EnergyWindow = EnergyWindow { emin: -15.0, emax: 0.0 };

    pub fn new(emin: f64, emax: f64) -> Result<Self> {
        ensure!(emin.is_finite() && emax.is_finite(), "Energy window bounds must be finite, got [{}, {}]", emin, emax);
        ensure!(emin < emax, "Energy window should satisfy emin < emax, got [{}, {}]", emin, emax);
        Ok(Self { emin, emax })
    }

    pub fn contains(&self, e: f64) -> bool {
        self.emin <= e && e <= self.emax
    }

    /// Keeps the grid points inside the window.
    pub fn slice(&self, energies: &Vector<f64>, dos: &Vector<f64>) -> (Vector<f64>, Vector<f64>) {
        let (e, d): (Vec<f64>, Vec<f64>) = energies.iter()
            .zip(dos.iter())
            .filter(|(e, _)| self.contains(**e))
            .map(|(e, d)| (*e, *d))
            .unzip();
        (Vector::from(e), Vector::from(d))
    }
}


impl fmt::Display for EnergyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.2}, {:.2}] eV", self.emin, self.emax)
    }
}


pub fn trapz(y: &Vector<f64>, x: &Vector<f64>) -> f64 {
    (1 .. x.len().min(y.len()))
        .map(|i| (x[i] - x[i - 1]) * (y[i] + y[i - 1]) * 0.5)
        .sum()
}


fn finite(x: f64) -> Option<f64> {
    if x.is_finite() { Some(x) } else { None }
}


/// Integral of the density, `None` when there is nothing to normalize with.
fn norm(e: &Vector<f64>, d: &Vector<f64>) -> Option<f64> {
    if e.len() < 2 {
        return None;
    }
    let n = trapz(d, e);
    if !n.is_finite() || n.abs() < EPS {
        None
    } else {
        Some(n)
    }
}


/// `∫ (E - c)^n D dE / ∫ D dE` on an already windowed grid.
fn moment_about(e: &Vector<f64>, d: &Vector<f64>, n: i32, c: f64) -> Option<f64> {
    let n0 = norm(e, d)?;
    let p = e.mapv(|x| (x - c).powi(n)) * d;
    finite(trapz(&p, e) / n0)
}


/// Central moments (center, m2, m3, m4) on an already windowed grid.
fn central_moments(e: &Vector<f64>, d: &Vector<f64>) -> Option<(f64, f64, f64, f64)> {
    let c = moment_about(e, d, 1, 0.0)?;
    Some((
        c,
        moment_about(e, d, 2, c)?,
        moment_about(e, d, 3, c)?,
        moment_about(e, d, 4, c)?,
    ))
}


/// Total number of states inside the window.
pub fn integrated_density(energies: &Vector<f64>, dos: &Vector<f64>, window: EnergyWindow) -> f64 {
    let (e, d) = window.slice(energies, dos);
    trapz(&d, &e)
}


/// n-th moment of the density in the window, about 0 eV, or about the band center if `central`.
pub fn n_moment(energies: &Vector<f64>, dos: &Vector<f64>, window: EnergyWindow, n: i32, central: bool) -> Option<f64> {
    let (e, d) = window.slice(energies, dos);
    let c = if central { moment_about(&e, &d, 1, 0.0)? } else { 0.0 };
    moment_about(&e, &d, n, c)
}


pub fn band_center(energies: &Vector<f64>, dos: &Vector<f64>, window: EnergyWindow) -> Option<f64> {
    n_moment(energies, dos, window, 1, false)
}


/// Fraction of states below E-fermi. The whole grid is used when `window` is `None`.
pub fn band_filling(energies: &Vector<f64>, dos: &Vector<f64>, window: Option<EnergyWindow>) -> Option<f64> {
    band_filling_below(energies, dos, window, 0.0)
}


/// Fraction of states with `E <= cutoff`.
pub fn band_filling_below(energies: &Vector<f64>, dos: &Vector<f64>, window: Option<EnergyWindow>, cutoff: f64) -> Option<f64> {
    let (e, d) = match window {
        Some(w) => w.slice(energies, dos),
        None    => (energies.to_owned(), dos.to_owned()),
    };
    let total = norm(&e, &d)?;

    let (eo, dd): (Vec<f64>, Vec<f64>) = e.iter()
        .zip(d.iter())
        .filter(|(e, _)| **e <= cutoff)
        .map(|(e, d)| (*e, *d))
        .unzip();
    finite(trapz(&Vector::from(dd), &Vector::from(eo)) / total)
}


pub fn band_skewness(energies: &Vector<f64>, dos: &Vector<f64>, window: EnergyWindow) -> Option<f64> {
    let (e, d) = window.slice(energies, dos);
    let (_, m2, m3, _) = central_moments(&e, &d)?;
    if m2 <= EPS {
        return None;
    }
    finite(m3 / m2.powf(1.5))
}


/// Pearson kurtosis `m4 / m2^2`, minus 3 if `excess`.
pub fn band_kurtosis(energies: &Vector<f64>, dos: &Vector<f64>, window: EnergyWindow, excess: bool) -> Option<f64> {
    let (e, d) = window.slice(energies, dos);
    let (_, m2, _, m4) = central_moments(&e, &d)?;
    if m2 <= EPS {
        return None;
    }
    let k = m4 / m2.powi(2);
    finite(if excess { k - 3.0 } else { k })
}


/// Standard deviation of the density in the window.
pub fn band_width(energies: &Vector<f64>, dos: &Vector<f64>, window: EnergyWindow) -> Option<f64> {
    let m2 = n_moment(energies, dos, window, 2, true)?;
    if m2 < 0.0 {
        return None;
    }
    finite(m2.sqrt())
}


/// Windows and conventions shared by both spin channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentParams {
    pub moment_window:   EnergyWindow,
    pub width_window:    EnergyWindow,
    pub filling_window:  Option<EnergyWindow>,
    pub excess_kurtosis: bool,
}


impl Default for MomentParams {
    fn default() -> Self {
        Self {
            moment_window:   EnergyWindow::MOMENTS,
            width_window:    EnergyWindow::OCCUPIED,
            filling_window:  None,
            excess_kurtosis: false,
        }
    }
}


/// Descriptors of one spin channel, `None` marks an undefined value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandDescriptors {
    pub center:   Option<f64>,
    pub kurtosis: Option<f64>,
    pub skewness: Option<f64>,
    pub filling:  Option<f64>,
    pub width:    Option<f64>,
}


impl BandDescriptors {
    pub fn compute(energies: &Vector<f64>, dos: &Vector<f64>, params: &MomentParams) -> Self {
        Self {
            center:   band_center(energies, dos, params.moment_window),
            kurtosis: band_kurtosis(energies, dos, params.moment_window, params.excess_kurtosis),
            skewness: band_skewness(energies, dos, params.moment_window),
            filling:  band_filling(energies, dos, params.filling_window),
            width:    band_width(energies, dos, params.width_window),
        }
    }

    /// Names of the undefined descriptors.
    pub fn undefined(&self) -> Vec<&'static str> {
        [
            ("center",   self.center),
            ("kurtosis", self.kurtosis),
            ("skewness", self.skewness),
            ("filling",  self.filling),
            ("width",    self.width),
        ].iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect()
    }
}
