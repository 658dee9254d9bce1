use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use log::warn;

use crate::{
    types::Result,
    OptProcess,
    commands::common::read_vasprun,
};


#[derive(Debug, Args)]
/// List the sites in vasprun.xml and the available orbital projections.
///
/// Use the printed site indices with 'rsdband dband -s'.
pub struct Sites {
    #[arg(default_value = "./vasprun.xml")]
    /// Specify the input vasprun.xml file, gzip compressed file is also accepted.
    vasprun: PathBuf,
}


impl OptProcess for Sites {
    fn process(&self) -> Result<()> {
        let vasprun = read_vasprun(&self.vasprun)?;

        println!("{}", "CRYSTAL STRUCTURE:".bright_yellow().bold());
        print!("{}", vasprun.structure);
        println!();
        println!("Fermi energy: {:.4} eV", vasprun.efermi);
        println!("ISPIN = {}, LSORBIT = {}", vasprun.ispin, vasprun.lsorbit);

        match vasprun.pdos.as_ref() {
            Some(pdos) => {
                println!("Projected DOS: {} spin set(s), {} grid points from {:.3} to {:.3} eV",
                         pdos.nspin, pdos.nedos,
                         pdos.energies[0] - vasprun.efermi,
                         pdos.energies[pdos.nedos - 1] - vasprun.efermi);
                println!("Projections: {}", pdos.nlm.join(" "));
            },
            None => {
                warn!("No projected DOS found in {:?}, set LORBIT = 10 or 11 in INCAR to get it.", &self.vasprun);
            },
        }

        Ok(())
    }
}
