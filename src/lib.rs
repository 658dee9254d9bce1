pub mod types;
pub mod vasp_parsers;
pub mod dos;
pub mod settings;
pub mod format;
pub mod commands;
pub mod cli;

pub use types::Result;
pub use cli::OptProcess;

pub use vasp_parsers::vasprun::{
    Vasprun,
    ProjectedDOS,
};

pub use dos::{
    EnergyWindow,
    MomentParams,
    BandDescriptors,
    SelectedDOS,
};

pub use settings::Settings;

pub use format::{
    DBandReport,
    DBandReportFormat,
};
