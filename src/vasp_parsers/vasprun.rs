use std::{
    fs,
    io::Read,
    path::Path,
};

use anyhow::{
    bail,
    ensure,
    Context,
};
use flate2::read::GzDecoder;
use itertools::Itertools;
use log::debug;
use ndarray::{
    Array1,
    Array4,
};
use rayon::prelude::*;
use regex::Regex;

use crate::types::{
    Result,
    Structure,
    Vector,
    Hyper,
    MatX3,
    Mat33,
};


/// Site, spin and orbital resolved density of states from the `<partial>` block.
#[derive(Clone, Debug)]
pub struct ProjectedDOS {
    pub nions:     usize,
    pub nspin:     usize,
    pub nedos:     usize,
    pub nlm:       Vec<String>,
    pub energies:  Vector<f64>,     // absolute energies, not shifted by E-fermi
    pub projected: Hyper<f64>,      // [ispin, iion, igrid, iorbit]
}


#[derive(Clone, Debug)]
pub struct Vasprun {
    pub efermi:    f64,
    pub ispin:     i32,
    pub lsorbit:   bool,
    pub structure: Structure,
    pub pdos:      Option<ProjectedDOS>,
}


impl Vasprun {
    pub fn from_file(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Cannot read file {:?}", path))?;

        // gzip magic number
        let txt = if bytes.starts_with(&[0x1f, 0x8b]) {
            debug!("{:?} is gzip compressed, decompressing ...", path);
            let mut buf = Vec::new();
            GzDecoder::new(&bytes[..]).read_to_end(&mut buf)
                .with_context(|| format!("Decompressing {:?} failed", path))?;
            buf
        } else {
            bytes
        };

        // vasprun.xml declares ISO-8859-1, non-ASCII bytes only appear in comments.
        let txt = String::from_utf8_lossy(&txt);
        Self::from_str(&txt)
            .with_context(|| format!("Parse file {:?} failed", path))
    }


    pub fn from_str(txt: &str) -> Result<Self> {
        let dos       = Self::dos_block(txt)?;
        let efermi    = Self::parse_efermi(dos)?;
        let ispin     = Self::parse_ispin(txt)?;
        let lsorbit   = Self::parse_lsorbit(txt);
        let symbols   = Self::parse_symbols(txt)?;
        let structure = Self::parse_structure(txt, &symbols)?;
        let pdos      = Self::parse_pdos(dos)?;

        if let Some(pdos) = pdos.as_ref() {
            ensure!(pdos.nions == structure.nions(),
                "Projected DOS contains {} ions while the structure has {} sites", pdos.nions, structure.nions());
            debug!("Projected DOS: nspin = {}, nions = {}, nedos = {}, nlm = {:?}",
                   pdos.nspin, pdos.nions, pdos.nedos, &pdos.nlm);
        }

        Ok(Self {
            efermi,
            ispin,
            lsorbit,
            structure,
            pdos,
        })
    }


    /// The first `<dos>` block. VASP 6.4 appends another one for KPOINTS_OPT, whose E-fermi
    /// doesn't belong to the projected DOS read here.
    fn dos_block(context: &str) -> Result<&str> {
        Self::slice_block(context, "<dos", "</dos>")
            .context("DOS block `<dos>` not found in vasprun.xml")
    }


    fn parse_efermi(context: &str) -> Result<f64> {
        Regex::new(r#"<i name="efermi">\s*(\S+)\s*</i>"#)?
            .captures(context)
            .context("E-fermi not found in the DOS block of vasprun.xml")?
            .get(1)
            .unwrap()
            .as_str()
            .parse::<f64>()
            .context("Invalid E-fermi value")
    }


    fn parse_ispin(context: &str) -> Result<i32> {
        match Regex::new(r#"name="ISPIN">\s*(\S+)\s*</i>"#)?.captures(context) {
            Some(c) => c.get(1).unwrap().as_str().parse::<i32>().context("Invalid ISPIN value"),
            None    => Ok(1),
        }
    }


    fn parse_lsorbit(context: &str) -> bool {
        Regex::new(r#"name="LSORBIT">\s*T"#)
            .map(|r| r.is_match(context))
            .unwrap_or(false)
    }


    fn parse_symbols(context: &str) -> Result<Vec<String>> {
        let block = Self::slice_block(context, r#"<array name="atoms""#, "</array>")
            .context("Atom info `<array name=\"atoms\">` not found")?;

        let ret = Regex::new(r"<rc><c>\s*([^<]*?)\s*</c><c>\s*\d+\s*</c></rc>")?
            .captures_iter(block)
            .map(|c| c.get(1).unwrap().as_str().to_string())
            .collect::<Vec<_>>();

        ensure!(!ret.is_empty(), "No atoms listed in atom info");
        Ok(ret)
    }


    /// Reads the `finalpos` structure, falls back to the last structure in the file.
    fn parse_structure(context: &str, symbols: &[String]) -> Result<Structure> {
        let start = match context.find(r#"<structure name="finalpos""#) {
            Some(pos) => pos,
            None => context.rfind("<structure")
                .context("No structure found in vasprun.xml")?,
        };
        let block = Self::slice_block(&context[start ..], "<structure", "</structure>")
            .context("Unterminated structure block")?;

        let basis = Self::parse_varray(block, "basis")?;
        ensure!(basis.len() == 3, "Lattice basis should contain 3 vectors, found {}", basis.len());
        let cell: Mat33<f64> = [basis[0], basis[1], basis[2]];

        let frac_pos = Self::parse_varray(block, "positions")?;
        ensure!(frac_pos.len() == symbols.len(),
            "Structure contains {} positions while {} atoms are listed", frac_pos.len(), symbols.len());

        let (ion_types, ions_per_type): (Vec<String>, Vec<i32>) = symbols.iter()
            .group_by(|s| *s)
            .into_iter()
            .map(|(k, g)| (k.to_string(), g.count() as i32))
            .unzip();

        Ok(Structure {
            car_pos: Structure::frac_to_cart(&frac_pos, &cell),
            cell,
            ion_types,
            ions_per_type,
            frac_pos,
        })
    }


    fn parse_varray(context: &str, name: &str) -> Result<MatX3<f64>> {
        let head = format!(r#"<varray name="{}""#, name);
        let block = Self::slice_block(context, &head, "</varray>")
            .with_context(|| format!("`{}` not found", head))?;

        block.lines()
            .map(str::trim)
            .filter(|l| l.starts_with("<v>"))
            .map(|l| {
                let v = Self::strip_row(l, "<v>", "</v>")
                    .split_whitespace()
                    .map(|x| x.parse::<f64>())
                    .collect::<std::result::Result<Vec<f64>, _>>()
                    .with_context(|| format!("Invalid row in varray `{}`: {}", name, l))?;
                ensure!(v.len() == 3, "Row in varray `{}` should have 3 columns: {}", name, l);
                Ok([v[0], v[1], v[2]])
            })
            .collect()
    }


    fn parse_pdos(context: &str) -> Result<Option<ProjectedDOS>> {
        let block = match Self::slice_block(context, "<partial>", "</partial>") {
            Some(b) => b,
            None => return Ok(None),
        };

        let fields = Regex::new(r"<field>\s*([^<]+?)\s*</field>")?
            .captures_iter(block)
            .map(|c| c.get(1).unwrap().as_str().to_string())
            .collect::<Vec<_>>();
        ensure!(fields.first().map(String::as_str) == Some("energy"),
            "The first field of projected DOS should be `energy`, found {:?}", fields.first());
        let nlm = fields[1 ..].to_vec();
        ensure!(!nlm.is_empty(), "No orbital fields in projected DOS");

        // (iion, ispin) -> raw rows
        let mut blocks: Vec<((usize, usize), Vec<&str>)> = vec![];
        let mut iion: Option<usize> = None;

        for line in block.lines().map(str::trim) {
            if let Some(n) = Self::set_index(line, "ion") {
                iion = Some(n);
            } else if let Some(n) = Self::set_index(line, "spin") {
                let i = iion.context("Spin set appears before any ion set in projected DOS")?;
                blocks.push(((i, n), vec![]));
            } else if line.starts_with("<r>") {
                let (_, rows) = blocks.last_mut()
                    .context("Data row appears outside of any spin set in projected DOS")?;
                rows.push(Self::strip_row(line, "<r>", "</r>"));
            }
        }

        ensure!(!blocks.is_empty(), "Projected DOS contains no data");
        let nions = blocks.iter().map(|((i, _), _)| *i).max().unwrap_or(0);
        let nspin = blocks.iter().map(|((_, s), _)| *s).max().unwrap_or(0);
        let nedos = blocks[0].1.len();
        let norb  = nlm.len();

        ensure!(blocks.len() == nions * nspin,
            "Projected DOS is incomplete: {} blocks for {} ions and {} spins", blocks.len(), nions, nspin);
        ensure!(nedos > 0, "Projected DOS has no grid points");

        let parsed = blocks.par_iter()
            .map(|((i, s), rows)| {
                ensure!(rows.len() == nedos,
                    "Ion {} spin {} has {} grid points, expected {}", i, s, rows.len(), nedos);
                rows.iter()
                    .map(|r| {
                        let v = r.split_whitespace()
                            .map(|x| x.parse::<f64>())
                            .collect::<std::result::Result<Vec<f64>, _>>()
                            .with_context(|| format!("Invalid projected DOS row: {}", r))?;
                        ensure!(v.len() == norb + 1,
                            "Projected DOS row should have {} columns, found {}: {}", norb + 1, v.len(), r);
                        Ok(v)
                    })
                    .collect::<Result<Vec<Vec<f64>>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let energies = Array1::from_iter(parsed[0].iter().map(|r| r[0]));
        let mut projected = Array4::<f64>::zeros((nspin, nions, nedos, norb));

        for (((iion, ispin), _), rows) in blocks.iter().zip(parsed.iter()) {
            for (igrid, row) in rows.iter().enumerate() {
                for (iorb, v) in row[1 ..].iter().enumerate() {
                    projected[[ispin - 1, iion - 1, igrid, iorb]] = *v;
                }
            }
        }

        Ok(Some(ProjectedDOS {
            nions,
            nspin,
            nedos,
            nlm,
            energies,
            projected,
        }))
    }


    /// Returns `N` from lines like `<set comment="ion N">`.
    fn set_index(line: &str, kind: &str) -> Option<usize> {
        let head = format!(r#"<set comment="{} "#, kind);
        line.strip_prefix(head.as_str())?
            .split('"')
            .next()?
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
    }


    fn strip_row<'a>(line: &'a str, head: &str, tail: &str) -> &'a str {
        let line = line.trim();
        let line = line.strip_prefix(head).unwrap_or(line);
        line.strip_suffix(tail).unwrap_or(line)
    }


    /// The slice starting at `head` and ending right after the first `tail` behind it.
    fn slice_block<'a>(context: &'a str, head: &str, tail: &str) -> Option<&'a str> {
        let start = context.find(head)?;
        let len = context[start ..].find(tail)? + tail.len();
        Some(&context[start .. start + len])
    }
}


#[cfg(test)]
mod test {
    use super::*;

    const ATOMINFO: &str = r#"
 <atominfo>
  <atoms>       3 </atoms>
  <types>       2 </types>
  <array name="atoms" >
   <dimension dim="1">ion</dimension>
   <field type="string">element</field>
   <field type="int">atomtype</field>
   <set>
    <rc><c>Ni</c><c>   1</c></rc>
    <rc><c>Ni</c><c>   1</c></rc>
    <rc><c>O </c><c>   2</c></rc>
   </set>
  </array>
  <array name="atomtypes" >
   <set>
    <rc><c>   2</c><c>Ni</c><c>     58.69300000</c></rc>
    <rc><c>   1</c><c>O </c><c>     16.00000000</c></rc>
   </set>
  </array>
 </atominfo>
"#;

    const STRUCTURES: &str = r#"
 <structure name="initialpos" >
  <crystal>
   <varray name="basis" >
    <v>       3.00000000       0.00000000       0.00000000 </v>
    <v>       0.00000000       3.00000000       0.00000000 </v>
    <v>       0.00000000       0.00000000       3.00000000 </v>
   </varray>
  </crystal>
  <varray name="positions" >
   <v>       0.00000000       0.00000000       0.00000000 </v>
   <v>       0.50000000       0.50000000       0.00000000 </v>
   <v>       0.25000000       0.25000000       0.50000000 </v>
  </varray>
 </structure>
 <structure name="finalpos" >
  <crystal>
   <varray name="basis" >
    <v>       2.00000000       0.00000000       0.00000000 </v>
    <v>       0.00000000       2.00000000       0.00000000 </v>
    <v>       0.00000000       0.00000000       4.00000000 </v>
   </varray>
  </crystal>
  <varray name="positions" >
   <v>       0.00000000       0.00000000       0.00000000 </v>
   <v>       0.50000000       0.50000000       0.00000000 </v>
   <v>       0.25000000       0.25000000       0.50000000 </v>
  </varray>
 </structure>
"#;

    const PARTIAL: &str = r#"
  <partial>
   <array>
    <dimension dim="1">gridpoints</dimension>
    <dimension dim="2">spin</dimension>
    <dimension dim="3">ion</dimension>
    <field>energy</field>
    <field>    s</field>
    <field>    p</field>
    <field>    d</field>
    <set>
     <set comment="ion 1">
      <set comment="spin 1">
       <r>   -1.0000    0.1000    0.2000    0.3000 </r>
       <r>    0.0000    0.4000    0.5000    0.6000 </r>
      </set>
     </set>
     <set comment="ion 2">
      <set comment="spin 1">
       <r>   -1.0000    1.1000    1.2000    1.3000 </r>
       <r>    0.0000    1.4000    1.5000    1.6000 </r>
      </set>
     </set>
    </set>
   </array>
  </partial>
"#;

    #[test]
    fn test_parse_efermi() {
        let input = r#"
 <dos>
  <i name="efermi">     -1.23456789 </i>
  <total>"#;
        assert_eq!(Vasprun::parse_efermi(input).unwrap(), -1.23456789);
        assert!(Vasprun::parse_efermi("<dos> </dos>").is_err());
    }

    #[test]
    fn test_dos_block() {
        let input = r#"
 <dos>
  <i name="efermi">      1.00000000 </i>
 </dos>
 <dos comment="kpoints_opt">
  <i name="efermi">      1.50000000 </i>
 </dos>"#;
        let dos = Vasprun::dos_block(input).unwrap();
        assert!(!dos.contains("kpoints_opt"));
        assert_eq!(Vasprun::parse_efermi(dos).unwrap(), 1.0);

        assert!(Vasprun::dos_block("<calculation> </calculation>").is_err());
    }

    #[test]
    fn test_parse_ispin_lsorbit() {
        let input = r#"
    <i type="int" name="ISPIN">     2</i>
    <i type="logical" name="LNONCOLLINEAR"> T  </i>
    <i type="logical" name="LSORBIT"> T  </i>"#;
        assert_eq!(Vasprun::parse_ispin(input).unwrap(), 2);
        assert!(Vasprun::parse_lsorbit(input));

        assert_eq!(Vasprun::parse_ispin("").unwrap(), 1);
        assert!(!Vasprun::parse_lsorbit(r#"<i type="logical" name="LSORBIT"> F  </i>"#));
    }

    #[test]
    fn test_parse_symbols() {
        assert_eq!(Vasprun::parse_symbols(ATOMINFO).unwrap(), vec!["Ni", "Ni", "O"]);
        assert!(Vasprun::parse_symbols("<atominfo> </atominfo>").is_err());
    }

    #[test]
    fn test_parse_structure() {
        let symbols = Vasprun::parse_symbols(ATOMINFO).unwrap();
        let s = Vasprun::parse_structure(STRUCTURES, &symbols).unwrap();

        assert_eq!(s.cell, [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 4.0]]);
        assert_eq!(s.ion_types, vec!["Ni", "O"]);
        assert_eq!(s.ions_per_type, vec![2, 1]);
        assert_eq!(s.frac_pos[2], [0.25, 0.25, 0.5]);
        assert_eq!(s.car_pos[2], [0.5, 0.5, 2.0]);

        // Without finalpos the last structure wins.
        let initial_only = &STRUCTURES[.. STRUCTURES.find(r#"<structure name="finalpos""#).unwrap()];
        let s = Vasprun::parse_structure(initial_only, &symbols).unwrap();
        assert_eq!(s.cell[0], [3.0, 0.0, 0.0]);

        assert!(Vasprun::parse_structure(STRUCTURES, &symbols[.. 2]).is_err());
    }

    #[test]
    fn test_parse_pdos() {
        let pdos = Vasprun::parse_pdos(PARTIAL).unwrap().unwrap();
        assert_eq!(pdos.nions, 2);
        assert_eq!(pdos.nspin, 1);
        assert_eq!(pdos.nedos, 2);
        assert_eq!(pdos.nlm, vec!["s", "p", "d"]);
        assert_eq!(pdos.energies.to_vec(), vec![-1.0, 0.0]);
        assert_eq!(pdos.projected.shape(), &[1, 2, 2, 3]);
        assert_eq!(pdos.projected[[0, 1, 1, 2]], 1.6);
        assert_eq!(pdos.projected[[0, 0, 0, 1]], 0.2);

        assert!(Vasprun::parse_pdos("<dos> </dos>").unwrap().is_none());
    }

    #[test]
    fn test_parse_pdos_malformed() {
        let ragged = PARTIAL.replacen("    0.6000 </r>", " </r>", 1);
        assert!(Vasprun::parse_pdos(&ragged).is_err());

        let truncated = PARTIAL.replacen("       <r>    0.0000    1.4000    1.5000    1.6000 </r>\n", "", 1);
        assert!(Vasprun::parse_pdos(&truncated).is_err());
    }

    #[test]
    fn test_set_index() {
        assert_eq!(Vasprun::set_index(r#"<set comment="ion 12">"#, "ion"), Some(12));
        assert_eq!(Vasprun::set_index(r#"<set comment="spin 2">"#, "spin"), Some(2));
        assert_eq!(Vasprun::set_index(r#"<set comment="spin 2">"#, "ion"), None);
        assert_eq!(Vasprun::set_index(r#"<set comment="kpoint 1">"#, "spin"), None);
    }
}
