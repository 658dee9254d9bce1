use std::{
    fs,
    io::Write,
    path::PathBuf,
};

use approx::assert_abs_diff_eq;
use flate2::{
    write::GzEncoder,
    Compression,
};
use tempdir::TempDir;

use rsdband::{
    Result,
    Vasprun,
};


macro_rules! get_fpath_in_current_dir {
    ($fname:expr) => {{
        let mut path = PathBuf::from(file!());
        path.pop();
        path.push($fname);
        path
    }}
}


#[test]
fn test_read_ispin2() -> Result<()> {
    let vasprun = Vasprun::from_file(&get_fpath_in_current_dir!("vasprun.xml.FeO_ispin2"))?;

    assert_eq!(vasprun.efermi, 1.0);
    assert_eq!(vasprun.ispin, 2);
    assert!(!vasprun.lsorbit);

    let s = &vasprun.structure;
    assert_eq!(s.ion_types, vec!["Fe", "O"]);
    assert_eq!(s.ions_per_type, vec![1, 1]);
    assert_eq!(s.cell, [[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]);  // finalpos
    assert_eq!(s.frac_pos[1], [0.5, 0.5, 0.5]);
    assert_eq!(s.car_pos[1], [2.0, 2.0, 2.0]);
    assert_abs_diff_eq!(s.volume(), 64.0, epsilon = 1E-10);

    let pdos = vasprun.pdos.as_ref().unwrap();
    assert_eq!(pdos.nions, 2);
    assert_eq!(pdos.nspin, 2);
    assert_eq!(pdos.nedos, 81);
    assert_eq!(pdos.nlm, vec!["s", "py", "pz", "px", "dxy", "dyz", "dz2", "dxz", "x2-y2"]);
    assert_eq!(pdos.energies[0], -19.0);
    assert_eq!(pdos.energies[80], 21.0);
    assert_eq!(pdos.projected.shape(), &[2, 2, 81, 9]);
    assert_eq!(pdos.projected[[0, 0, 0, 0]], 0.0125);
    assert_eq!(pdos.projected[[1, 1, 0, 0]], 0.01);
    Ok(())
}


#[test]
fn test_read_ispin1() -> Result<()> {
    let vasprun = Vasprun::from_file(&get_fpath_in_current_dir!("vasprun.xml.FeO_ispin1"))?;

    assert_eq!(vasprun.ispin, 1);
    let pdos = vasprun.pdos.as_ref().unwrap();
    assert_eq!(pdos.nspin, 1);
    assert_eq!(pdos.projected.shape(), &[1, 2, 81, 9]);
    Ok(())
}


#[test]
fn test_read_no_partial() -> Result<()> {
    let vasprun = Vasprun::from_file(&get_fpath_in_current_dir!("vasprun.xml.FeO_no_partial"))?;
    assert!(vasprun.pdos.is_none());
    assert_eq!(vasprun.structure.nions(), 2);
    Ok(())
}


#[test]
fn test_read_gzip() -> Result<()> {
    let fname = get_fpath_in_current_dir!("vasprun.xml.FeO_ispin2");
    let plain = Vasprun::from_file(&fname)?;

    let tmpdir = TempDir::new("rsdband_test")?;
    let gzpath = tmpdir.path().join("vasprun.xml.gz");
    let mut enc = GzEncoder::new(fs::File::create(&gzpath)?, Compression::default());
    enc.write_all(&fs::read(&fname)?)?;
    enc.finish()?;

    let zipped = Vasprun::from_file(&gzpath)?;
    assert_eq!(zipped.efermi, plain.efermi);
    assert_eq!(zipped.structure, plain.structure);
    assert_eq!(zipped.pdos.unwrap().projected, plain.pdos.unwrap().projected);
    Ok(())
}


#[test]
fn test_read_failed() {
    assert!(Vasprun::from_file(&get_fpath_in_current_dir!("vasprun.xml.not_exist")).is_err());

    let txt = fs::read_to_string(get_fpath_in_current_dir!("vasprun.xml.FeO_ispin2")).unwrap();
    let truncated = &txt[.. txt.find("<dos>").unwrap()];
    assert!(Vasprun::from_str(truncated).is_err());
    assert!(Vasprun::from_str("").is_err());
}


#[test]
fn test_read_with_kpoints_opt_dos() -> Result<()> {
    let txt = fs::read_to_string(get_fpath_in_current_dir!("vasprun.xml.FeO_ispin2"))?;
    let plain = Vasprun::from_str(&txt)?;

    let kpoints_opt = r#" <dos comment="kpoints_opt">
  <i name="efermi">      1.50000000 </i>
 </dos>
</modeling>"#;
    let txt = txt.replacen("</modeling>", kpoints_opt, 1);
    let vasprun = Vasprun::from_str(&txt)?;

    assert_eq!(vasprun.efermi, 1.0);
    assert_eq!(vasprun.pdos.unwrap().projected, plain.pdos.unwrap().projected);
    Ok(())
}
