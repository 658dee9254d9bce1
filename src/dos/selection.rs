use anyhow::{
    ensure,
    Context,
};
use log::debug;
use ndarray::{
    s,
    Array1,
};

use crate::{
    types::{
        Result,
        Vector,
        OrbitalType,
        SpinPair,
        index_transform,
    },
    vasp_parsers::vasprun::{
        Vasprun,
        ProjectedDOS,
    },
};


/// Spin resolved densities of the selected sites and orbitals on a shared grid.
#[derive(Clone, Debug)]
pub struct SelectedDOS {
    /// E - E-fermi, in eV
    pub energies: Vector<f64>,
    pub dos:      SpinPair<Vector<f64>>,
    /// Zero-based site indices, sorted and deduplicated
    pub iions:    Vec<usize>,
    pub iorbits:  Vec<usize>,
    pub orbital:  OrbitalType,
}


impl SelectedDOS {
    /// Selects the `orbital` projections of `sites` for both spin channels and sums them up.
    ///
    /// Site indices count from 1, negative indices count from the tail.
    pub fn from_vasprun(vasprun: &Vasprun, sites: &[i32], orbital: OrbitalType) -> Result<Self> {
        let pdos = vasprun.pdos.as_ref()
            .context("No projected DOS in vasprun.xml, set LORBIT = 10 or 11 in INCAR and rerun VASP")?;

        ensure!(!vasprun.lsorbit && pdos.nspin != 4,
            "Non-collinear calculation detected, spin-up and spin-down projections are not available");
        ensure!(pdos.nspin == 2,
            "Only {} spin channel found (ISPIN = {}), spin-down projection is not available", pdos.nspin, vasprun.ispin);
        ensure!(!sites.is_empty(), "No site selected");

        let mut iions = sites.iter()
            .map(|&i| index_transform(i, pdos.nions))
            .collect::<Result<Vec<_>>>()?;
        iions.sort_unstable();
        iions.dedup();

        let iorbits = Self::parse_iorbits(orbital, &pdos.nlm)?;
        debug!("Selected ions {:?} and orbitals {:?}", &iions, &iorbits);

        let dos = SpinPair::new(
            Self::sum_projections(pdos, 0, &iions, &iorbits),
            Self::sum_projections(pdos, 1, &iions, &iorbits),
        );

        Ok(Self {
            energies: &pdos.energies - vasprun.efermi,
            dos,
            iions,
            iorbits,
            orbital,
        })
    }


    /// Column indices of `nlm` that belong to `orbital`.
    pub fn parse_iorbits(orbital: OrbitalType, nlm: &[String]) -> Result<Vec<usize>> {
        let ret = nlm.iter()
            .enumerate()
            .filter(|(_, l)| orbital.owns(l))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();

        ensure!(!ret.is_empty(),
            "Orbital {:?} not available in projections {:?}", orbital.to_string(), nlm);
        Ok(ret)
    }


    fn sum_projections(pdos: &ProjectedDOS, ispin: usize, iions: &[usize], iorbits: &[usize]) -> Vector<f64> {
        let mut ret = Array1::<f64>::zeros(pdos.nedos);
        for &iion in iions {
            for &iorb in iorbits {
                ret += &pdos.projected.slice(s![ispin, iion, .., iorb]);
            }
        }
        ret
    }


    pub fn swap_spins(self) -> Self {
        Self {
            dos: self.dos.swap(),
            ..self
        }
    }
}
