use std::{
    fs,
    path::PathBuf,
};

use clap::Args;
use log::{
    info,
    warn,
};
use serde::Serialize;
use anyhow::{
    ensure,
    Context,
};

use crate::{
    types::{
        Result,
        OrbitalType,
    },
    OptProcess,
    Settings,
    dos::{
        self,
        SelectedDOS,
    },
    format::{
        DBandReport,
        DBandReportFormat,
    },
    commands::common::{
        read_vasprun,
        write_array_to_txt,
    },
};


#[derive(Debug, Args)]
/// Calculate band center, kurtosis, skewness, filling and width of the projected DOS.
///
/// The projected DOS of the selected sites and orbital is read from vasprun.xml for both spin
/// channels, then the descriptors are integrated with the trapezoidal rule over energy windows
/// relative to the Fermi level:{n}
/// - center, skewness and kurtosis: `moment_range`, [-15, 15] eV by default;{n}
/// - width: `width_range`, [-15, 0] eV by default, the standard deviation of occupied states;{n}
/// - filling: states below E-fermi over all states, whole energy grid by default.
///
/// Descriptors of a window without any state are reported as 'undefined'.
///
/// Hint: Requires a spin-polarized calculation (ISPIN = 2) with LORBIT = 10 or 11.
pub struct Dband {
    #[arg(default_value = "./vasprun.xml")]
    /// Specify the input vasprun.xml file, gzip compressed file is also accepted.
    vasprun: PathBuf,

    #[arg(short = 's', long, value_delimiter = ',', allow_hyphen_values = true,
          required_unless_present = "gen_template")]
    /// Selects the site indices, starting from 1. Projections of multiple sites are summed up.
    ///
    /// Multiple sites are separated by commas or given by repeating the option, e.g.
    /// "-s 1,3" or "-s 1 -s 3". Negative index means counting reversely, e.g. "-s -1"
    /// selects the last site.
    sites: Vec<i32>,

    #[arg(long, value_enum, ignore_case = true)]
    /// Orbital to analyse, 'd' if not specified in configuration.
    orbital: Option<OrbitalType>,

    #[arg(long, num_args(2), allow_negative_numbers = true, value_names = ["EMIN", "EMAX"])]
    /// Energy window for band center, skewness and kurtosis, in eV relative to E-fermi.
    erange: Option<Vec<f64>>,

    #[arg(long, num_args(2), allow_negative_numbers = true, value_names = ["EMIN", "EMAX"])]
    /// Energy window for band width, in eV relative to E-fermi.
    width_range: Option<Vec<f64>>,

    #[arg(long, num_args(2), allow_negative_numbers = true, value_names = ["EMIN", "EMAX"])]
    /// Energy window for band filling, in eV relative to E-fermi. The whole grid by default.
    filling_range: Option<Vec<f64>>,

    #[arg(long)]
    /// Reports excess kurtosis, i.e. subtracts 3 so that a Gaussian band has zero kurtosis.
    excess_kurtosis: bool,

    #[arg(short, long)]
    /// Configuration file in TOML format, see '--gen-template'.
    config: Option<PathBuf>,

    #[arg(long)]
    /// Generate the configuration template and exit. It is written to the '--config' path if
    /// given, 'rsdband.toml' otherwise.
    gen_template: bool,

    #[arg(long)]
    /// Write the selected DOS inside the moment window as txt file: E-Ef, DOS up and DOS down.
    txtout: Option<PathBuf>,

    #[arg(long = "no-structure")]
    /// Don't print the structure summary
    no_print_structure: bool,

    #[arg(long = "no-insights")]
    /// Don't print the analysis insights
    no_print_insights: bool,
}


#[derive(Debug, Default, Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    orbital:         Option<OrbitalType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    moment_range:    Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width_range:     Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filling_range:   Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    excess_kurtosis: Option<bool>,
}


fn to_range(v: &Option<Vec<f64>>) -> Result<Option<[f64; 2]>> {
    match v {
        Some(v) => {
            ensure!(v.len() == 2, "Energy range needs exactly two values, got {:?}", v);
            Ok(Some([v[0], v[1]]))
        },
        None => Ok(None),
    }
}


impl Dband {
    fn overrides(&self) -> Result<Overrides> {
        Ok(Overrides {
            orbital:         self.orbital,
            moment_range:    to_range(&self.erange)?,
            width_range:     to_range(&self.width_range)?,
            filling_range:   to_range(&self.filling_range)?,
            excess_kurtosis: if self.excess_kurtosis { Some(true) } else { None },
        })
    }
}


impl OptProcess for Dband {
    fn process(&self) -> Result<()> {
        if self.gen_template {
            let path = self.config.clone().unwrap_or_else(|| PathBuf::from(Settings::TEMPLATE_NAME));
            info!("Writing configuration template to {:?}", &path);
            fs::write(&path, Settings::template()?)
                .with_context(|| format!("Cannot write configuration template to {:?}", &path))?;
            return Ok(());
        }

        let settings = Settings::load(self.config.as_deref(), self.overrides()?)?;
        let params = settings.moment_params()?;

        let vasprun = read_vasprun(&self.vasprun)?;
        let selected = SelectedDOS::from_vasprun(&vasprun, &self.sites, settings.orbital)?;

        info!("Analysing {}-band of site(s) {:?} ...", settings.orbital,
              selected.iions.iter().map(|i| i + 1).collect::<Vec<_>>());
        let descriptors = dos::analyze(&selected, &params);

        for (spin, d) in [("up", &descriptors.up), ("down", &descriptors.down)].iter() {
            let undefined = d.undefined();
            if !undefined.is_empty() {
                warn!("Spin {} {} undefined, the window contains no {}-states",
                      spin, undefined.join(", "), settings.orbital);
            }
        }

        if let Some(txtout) = self.txtout.as_ref() {
            let (e, up)   = params.moment_window.slice(&selected.energies, &selected.dos.up);
            let (_, down) = params.moment_window.slice(&selected.energies, &selected.dos.down);
            info!("Writing selected DOS to {:?}", txtout);
            write_array_to_txt(txtout, vec![&e, &up, &down], "E-Ef(eV)  DOS_up  DOS_down")?;
        }

        let report = DBandReport {
            efermi: vasprun.efermi,
            structure: vasprun.structure,
            iions: selected.iions,
            orbital: settings.orbital,
            params,
            descriptors,
        };

        let mut rf = DBandReportFormat::from(&report);
        rf.print_structure(!self.no_print_structure)
          .print_insights (!self.no_print_insights);
        print!("{}", rf);

        Ok(())
    }
}
