use std::fmt;

use colored::Colorize;

use crate::{
    types::{
        Structure,
        OrbitalType,
        SpinPair,
    },
    dos::{
        MomentParams,
        BandDescriptors,
    },
};


/// Spin splitting of band centers above this is reported, in eV.
const SPLITTING_THRESHOLD: f64 = 0.1;
/// Filling difference between spin channels above this is reported.
const POLARIZATION_THRESHOLD: f64 = 0.1;
const DEEP_CENTER: f64 = -2.0;
const SHALLOW_CENTER: f64 = -1.0;


fn gcd(a: i32, b: i32) -> i32 {
    if b == 0 { a.abs() } else { gcd(b, a % b) }
}


impl Structure {
    /// Element counts merged over repeated types, in order of appearance.
    pub fn composition(&self) -> Vec<(String, i32)> {
        let mut ret: Vec<(String, i32)> = vec![];
        for (t, n) in self.ion_types.iter().zip(self.ions_per_type.iter()) {
            match ret.iter_mut().find(|(s, _)| s == t) {
                Some((_, m)) => *m += n,
                None => ret.push((t.clone(), *n)),
            }
        }
        ret
    }

    pub fn formula(&self) -> String {
        self.composition().iter()
            .map(|(s, n)| format!("{}{}", s, n))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn reduced_formula(&self) -> String {
        let comp = self.composition();
        let g = comp.iter().fold(0, |acc, (_, n)| gcd(acc, *n)).max(1);
        comp.iter()
            .map(|(s, n)| if n / g == 1 { s.to_string() } else { format!("{}{}", s, n / g) })
            .collect()
    }
}


impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abc = self.lengths();
        let angles = self.angles();

        writeln!(f, "Full Formula ({})", self.formula())?;
        writeln!(f, "Reduced Formula: {}", self.reduced_formula())?;
        writeln!(f, "abc   : {:12.6} {:12.6} {:12.6}", abc[0], abc[1], abc[2])?;
        writeln!(f, "angles: {:12.6} {:12.6} {:12.6}", angles[0], angles[1], angles[2])?;
        writeln!(f, "volume: {:12.6}", self.volume())?;
        writeln!(f, "Sites ({})", self.nions())?;
        writeln!(f, "{:>5}  {:<4} {:>10} {:>10} {:>10}", "#", "SP", "a", "b", "c")?;
        writeln!(f, "{:->5}  {:-<4} {:->10} {:->10} {:->10}", "", "", "", "", "")?;

        for (i, (sym, p)) in self.symbols().iter().zip(self.frac_pos.iter()).enumerate() {
            writeln!(f, "{:>5}  {:<4} {:10.6} {:10.6} {:10.6}", i + 1, sym, p[0], p[1], p[2])?;
        }
        Ok(())
    }
}


/// Everything the `dband` command reports.
#[derive(Clone, Debug)]
pub struct DBandReport {
    pub efermi:      f64,
    pub structure:   Structure,
    /// Zero-based site indices
    pub iions:       Vec<usize>,
    pub orbital:     OrbitalType,
    pub params:      MomentParams,
    pub descriptors: SpinPair<BandDescriptors>,
}


impl DBandReport {
    /// Difference of the fillings, up minus down.
    pub fn filling_polarization(&self) -> Option<f64> {
        Some(self.descriptors.up.filling? - self.descriptors.down.filling?)
    }

    pub fn insights(&self) -> Vec<String> {
        let mut ret = vec![];
        let centers = (self.descriptors.up.center, self.descriptors.down.center);

        if let (Some(up), Some(down)) = centers {
            let splitting = (up - down).abs();
            if splitting > SPLITTING_THRESHOLD {
                ret.push(format!("Significant spin-splitting detected ({:.3} eV)", splitting));
            }
        }

        if let Some(pol) = self.filling_polarization() {
            if pol.abs() > POLARIZATION_THRESHOLD {
                ret.push(format!("Spin-polarized {}-band with filling difference {:.3}", self.orbital, pol));
            }
        }

        if let (Some(up), Some(down)) = centers {
            let avg = 0.5 * (up + down);
            if avg < DEEP_CENTER {
                ret.push(format!("Deep {}-band center ({:.3} eV) suggests strong bonding", self.orbital, avg));
            } else if avg > SHALLOW_CENTER {
                ret.push(format!("Shallow {}-band center ({:.3} eV) suggests weak bonding", self.orbital, avg));
            }
        }

        ret
    }
}


pub struct DBandReportFormat<'a> {
    _data           : &'a DBandReport,

    print_structure : bool,
    print_insights  : bool,
}


impl<'a> From<&'a DBandReport> for DBandReportFormat<'a> {
    fn from(data: &'a DBandReport) -> Self {
        Self {
            _data           : data,
            print_structure : true,
            print_insights  : true,
        }
    }
}


macro_rules! impl_builder_item {
    ($t: tt) => {
        pub fn $t(&mut self, arg: bool) -> &mut Self {
            self.$t = arg;
            self
        }
    };
}

// Use non-consuming builder pattern
impl DBandReportFormat<'_> {
    impl_builder_item!(print_structure);
    impl_builder_item!(print_insights);
}


fn fmt_value(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{:<15.4}", x),
        None    => format!("{:<15}", "undefined"),
    }
}


impl fmt::Display for DBandReportFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self._data;
        let sep = "=".repeat(60);
        let orb = r.orbital.to_string().to_uppercase();

        writeln!(f, "{}", sep)?;
        writeln!(f, "{}", "ELECTRONIC STRUCTURE ANALYSIS RESULTS".bold())?;
        writeln!(f, "{}", sep)?;

        if self.print_structure {
            writeln!(f, "\n{}", "CRYSTAL STRUCTURE:".bright_yellow().bold())?;
            write!(f, "{}", r.structure)?;
        }

        writeln!(f, "\n{}", "TARGET SITES:".bright_yellow().bold())?;
        let symbols = r.structure.symbols();
        for &i in r.iions.iter() {
            let p = r.structure.frac_pos[i];
            writeln!(f, "Site {:<5} {:<4} frac: {:10.6} {:10.6} {:10.6}", i + 1, symbols[i], p[0], p[1], p[2])?;
        }
        writeln!(f, "Fermi energy: {:.4} eV", r.efermi)?;

        writeln!(f, "\n{}", format!("{}-BAND ELECTRONIC PROPERTIES:", orb).bright_yellow().bold())?;
        writeln!(f, "Moment window {}, width window {}, filling window {}",
                 r.params.moment_window,
                 r.params.width_window,
                 r.params.filling_window.map(|w| w.to_string()).unwrap_or_else(|| "full grid".to_string()))?;
        writeln!(f, "Kurtosis convention: {}",
                 if r.params.excess_kurtosis { "excess (Gaussian = 0)" } else { "Pearson (Gaussian = 3)" })?;
        writeln!(f, "{:<20} {:<15} {:<15}", "Property", "Spin-Up", "Spin-Down")?;
        writeln!(f, "{}", "-".repeat(50))?;

        let (up, down) = (&r.descriptors.up, &r.descriptors.down);
        let rows = [
            ("Band Center (eV)", up.center,   down.center),
            ("Band Kurtosis",    up.kurtosis, down.kurtosis),
            ("Band Skewness",    up.skewness, down.skewness),
            ("Band Filling",     up.filling,  down.filling),
            ("Band Width (eV)",  up.width,    down.width),
        ];
        for (name, u, d) in rows.iter() {
            writeln!(f, "{:<20} {} {}", name, fmt_value(*u), fmt_value(*d))?;
        }

        writeln!(f, "\n{}", "SPIN POLARIZATION:".bright_yellow().bold())?;
        writeln!(f, "{}-band filling difference (up - down): {}", r.orbital, fmt_value(r.filling_polarization()).trim_end())?;

        if self.print_insights {
            writeln!(f, "\n{}", "ANALYSIS INSIGHTS:".bright_yellow().bold())?;
            let insights = r.insights();
            if insights.is_empty() {
                writeln!(f, "Nothing remarkable.")?;
            }
            for line in insights {
                writeln!(f, "• {}", line)?;
            }
        }

        Ok(())
    }
}
