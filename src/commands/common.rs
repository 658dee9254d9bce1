use std::{
    io::Write,
    fs,
    path::Path,
};

use log::{
    info,
    debug,
};
use anyhow::{
    bail,
    Context,
};

use crate::{
    types::{
        Result,
        Vector,
    },
    vasp_parsers::vasprun::Vasprun,
};


pub fn read_vasprun(path: &Path) -> Result<Vasprun> {
    info!("Reading {:?} ...", path);
    debug!("    vasprun.xml file path = {:?}", fs::canonicalize(path));

    let vasprun = Vasprun::from_file(path)?;
    debug!("E-fermi = {} eV, ISPIN = {}, LSORBIT = {}, {} sites",
           vasprun.efermi, vasprun.ispin, vasprun.lsorbit, vasprun.structure.nions());
    Ok(vasprun)
}


pub fn write_array_to_txt(file_name: &(impl AsRef<Path> + ?Sized), ys: Vec<&Vector<f64>>, comment: &str) -> Result<()> {
    let ncol = ys.len();

    let x = ys.get(0).context("At least one data set is needed")?;
    let nrow = x.len();

    if nrow == 0 || !ys.iter().all(|y| y.len() == nrow) {
        bail!("[WRT_ARRAY]: input data with zero length or they don't have consistent lengths");
    }

    let mut f = fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(file_name)?;

    writeln!(f, "# {}", comment.trim())?;

    for irow in 0 .. nrow {
        let mut s = String::with_capacity(16 * ncol + 1);
        for y in ys.iter() {
            s.push_str(&format!("  {:15.6}", y[irow]));
        }
        s.push('\n');

        f.write_all(s.as_bytes())?;
    }

    Ok(())
}
