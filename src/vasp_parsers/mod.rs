pub mod vasprun;
