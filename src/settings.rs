use std::path::Path;

use anyhow::{
    ensure,
    Context,
};
use figment::{
    Figment,
    providers::{
        Format,
        Toml,
        Env,
        Serialized,
    },
};
use serde::{
    Serialize,
    Deserialize,
};

use crate::{
    types::{
        Result,
        OrbitalType,
    },
    dos::{
        EnergyWindow,
        MomentParams,
    },
};


/// Analysis settings, layered as defaults < TOML file < `RSDBAND_*` environment < command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub orbital:         OrbitalType,
    pub moment_range:    [f64; 2],
    pub width_range:     [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filling_range:   Option<[f64; 2]>,
    pub excess_kurtosis: bool,
}


impl Default for Settings {
    fn default() -> Self {
        let m = EnergyWindow::MOMENTS;
        let w = EnergyWindow::OCCUPIED;
        Self {
            orbital:         OrbitalType::D,
            moment_range:    [m.emin, m.emax],
            width_range:     [w.emin, w.emax],
            filling_range:   None,
            excess_kurtosis: false,
        }
    }
}


const TEMPLATE_HEAD: &str = "\
# rsdband configuration file, all the keys are optional.
#
# orbital:          one of 's', 'p', 'd' and 'f', case insensitive
# moment_range:     [emin, emax] in eV relative to E-fermi, used for band center, skewness and kurtosis
# width_range:      [emin, emax] used for band width, occupied states by default
# filling_range:    [emin, emax] used for band filling, the whole energy grid if left out
# excess_kurtosis:  subtract 3 from the kurtosis, a Gaussian band then has zero kurtosis
#
# Environment variables prefixed with 'RSDBAND_' override this file, e.g. RSDBAND_ORBITAL=p

";


impl Settings {
    pub const ENV_PREFIX: &'static str = "RSDBAND_";
    pub const TEMPLATE_NAME: &'static str = "rsdband.toml";

    /// Defaults, then the optional TOML file, then the environment.
    pub fn figment(config: Option<&Path>) -> Result<Figment> {
        let mut fig = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(path) = config {
            ensure!(path.is_file(), "Configuration file {:?} not found", path);
            fig = fig.merge(Toml::file(path));
        }

        Ok(fig.merge(Env::prefixed(Self::ENV_PREFIX).ignore(&["log"])))
    }


    /// Loads the settings with `overrides` taking the highest priority.
    pub fn load(config: Option<&Path>, overrides: impl Serialize) -> Result<Self> {
        let ret: Self = Self::figment(config)?
            .merge(Serialized::defaults(overrides))
            .extract()
            .context("Invalid rsdband configuration")?;
        ret.moment_params()?;
        Ok(ret)
    }


    pub fn moment_params(&self) -> Result<MomentParams> {
        let window = |r: [f64; 2], name: &str| {
            EnergyWindow::new(r[0], r[1]).with_context(|| format!("Invalid `{}`", name))
        };

        Ok(MomentParams {
            moment_window:   window(self.moment_range, "moment_range")?,
            width_window:    window(self.width_range, "width_range")?,
            filling_window:  self.filling_range.map(|r| window(r, "filling_range")).transpose()?,
            excess_kurtosis: self.excess_kurtosis,
        })
    }


    pub fn template() -> Result<String> {
        let body = toml::to_string(&Settings::default())?;
        Ok(format!("{}{}", TEMPLATE_HEAD, body))
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    #[derive(Serialize, Default)]
    struct Overrides {
        #[serde(skip_serializing_if = "Option::is_none")]
        orbital: Option<OrbitalType>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width_range: Option<[f64; 2]>,
    }

    #[test]
    fn test_defaults() {
        let s = Settings::load(None, Overrides::default()).unwrap();
        assert_eq!(s, Settings::default());

        let p = s.moment_params().unwrap();
        assert_eq!(p, MomentParams::default());
    }

    #[test]
    fn test_template_roundtrip() {
        let template = Settings::template().unwrap();
        assert!(template.starts_with("# rsdband"));

        let s: Settings = Figment::from(Toml::string(&template)).extract().unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_file_and_overrides() {
        let tmpdir = TempDir::new("rsdband_test").unwrap();
        let path = tmpdir.path().join("rsdband.toml");
        fs::write(&path, r#"
orbital = "p"
moment_range = [-10.0, 10.0]
filling_range = [-12.0, 5.0]
excess_kurtosis = true
"#).unwrap();

        let s = Settings::load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(s.orbital, OrbitalType::P);
        assert_eq!(s.moment_range, [-10.0, 10.0]);
        assert_eq!(s.width_range, [-15.0, 0.0]);
        assert_eq!(s.filling_range, Some([-12.0, 5.0]));
        assert!(s.excess_kurtosis);

        let overrides = Overrides {
            orbital: Some(OrbitalType::F),
            width_range: Some([-8.0, 0.0]),
        };
        let s = Settings::load(Some(&path), overrides).unwrap();
        assert_eq!(s.orbital, OrbitalType::F);
        assert_eq!(s.width_range, [-8.0, 0.0]);
        assert_eq!(s.moment_range, [-10.0, 10.0]);
    }

    #[test]
    fn test_orbital_ignores_case() {
        let tmpdir = TempDir::new("rsdband_test").unwrap();
        let path = tmpdir.path().join("rsdband.toml");

        fs::write(&path, "orbital = \"P\"\n").unwrap();
        let s = Settings::load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(s.orbital, OrbitalType::P);

        fs::write(&path, "orbital = \"f\"\n").unwrap();
        let s = Settings::load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(s.orbital, OrbitalType::F);
    }

    #[test]
    fn test_invalid_settings() {
        let tmpdir = TempDir::new("rsdband_test").unwrap();
        let path = tmpdir.path().join("bad.toml");

        fs::write(&path, "moment_range = [5.0, -5.0]\n").unwrap();
        assert!(Settings::load(Some(&path), Overrides::default()).is_err());

        fs::write(&path, "orbital = \"g\"\n").unwrap();
        assert!(Settings::load(Some(&path), Overrides::default()).is_err());

        assert!(Settings::load(Some(&tmpdir.path().join("missing.toml")), Overrides::default()).is_err());
    }
}
