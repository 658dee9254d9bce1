pub mod moments;
pub mod selection;

pub use moments::{
    EnergyWindow,
    MomentParams,
    BandDescriptors,
};
pub use selection::SelectedDOS;

use crate::types::SpinPair;


/// Computes the descriptors of both spin channels with the same windows and conventions.
pub fn analyze(selected: &SelectedDOS, params: &MomentParams) -> SpinPair<BandDescriptors> {
    let (up, down) = rayon::join(
        || BandDescriptors::compute(&selected.energies, &selected.dos.up, params),
        || BandDescriptors::compute(&selected.energies, &selected.dos.down, params),
    );
    SpinPair::new(up, down)
}
