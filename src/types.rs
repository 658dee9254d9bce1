use ndarray::{
    Array1,
    Array4,
};
use clap::ValueEnum;
use serde::{
    Serialize,
    Deserialize,
};
use anyhow::bail;

pub type Result<T> = anyhow::Result<T>;

pub type Vector<T> = Array1<T>;  // Define this type to use broadcast operations.
pub type Hyper<T>  = Array4<T>;
pub type MatX3<T> = Vec<[T;3]>;  // Nx3 matrix
pub type Mat33<T> = [[T;3];3];   // 3x3 matrix


#[derive(Clone, Debug, PartialEq)]
pub struct Structure {
    pub cell          : Mat33<f64>,
    pub ion_types     : Vec<String>,
    pub ions_per_type : Vec<i32>,
    pub car_pos       : MatX3<f64>,
    pub frac_pos      : MatX3<f64>,
}


impl Structure {
    pub fn nions(&self) -> usize {
        self.frac_pos.len()
    }

    /// Element symbol of each site, expanded from `ion_types` and `ions_per_type`.
    pub fn symbols(&self) -> Vec<&str> {
        self.ion_types.iter()
            .zip(self.ions_per_type.iter())
            .flat_map(|(t, &n)| std::iter::repeat(t.as_str()).take(n as usize))
            .collect()
    }

    pub fn lengths(&self) -> [f64; 3] {
        let c = &self.cell;
        [norm(&c[0]), norm(&c[1]), norm(&c[2])]
    }

    /// Lattice angles alpha (b^c), beta (a^c), gamma (a^b) in degrees.
    pub fn angles(&self) -> [f64; 3] {
        let c = &self.cell;
        let angle = |u: &[f64; 3], v: &[f64; 3]| {
            (dot(u, v) / (norm(u) * norm(v))).clamp(-1.0, 1.0).acos().to_degrees()
        };
        [angle(&c[1], &c[2]), angle(&c[0], &c[2]), angle(&c[0], &c[1])]
    }

    pub fn volume(&self) -> f64 {
        let c = self.cell;

        // |00 01 02|
        // |10 11 12|
        // |20 21 22|

        (c[0][0] * (c[1][1] * c[2][2] - c[2][1] * c[1][2]) -
            c[0][1] * (c[1][0] * c[2][2] - c[1][2] * c[2][0]) +
            c[0][2] * (c[1][0] * c[2][1] - c[1][1] * c[2][0])).abs()
    }

    pub fn frac_to_cart(frac: &MatX3<f64>, cell: &Mat33<f64>) -> MatX3<f64> {
        frac.iter()
            .map(|f| {
                let mut v = [0.0; 3];
                for (i, x) in v.iter_mut().enumerate() {
                    *x = f[0] * cell[0][i] + f[1] * cell[1][i] + f[2] * cell[2][i];
                }
                v
            })
            .collect()
    }
}


fn dot(u: &[f64; 3], v: &[f64; 3]) -> f64 {
    u[0] * v[0] + u[1] * v[1] + u[2] * v[2]
}

fn norm(u: &[f64; 3]) -> f64 {
    dot(u, u).sqrt()
}


/// One value per collinear spin channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinPair<T> {
    pub up:   T,
    pub down: T,
}


impl<T> SpinPair<T> {
    pub fn new(up: T, down: T) -> Self {
        Self { up, down }
    }

    pub fn swap(self) -> Self {
        Self { up: self.down, down: self.up }
    }
}


/// Angular momentum channel of the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrbitalType {
    #[serde(alias = "S")]
    S,
    #[serde(alias = "P")]
    P,
    #[serde(alias = "D")]
    D,
    #[serde(alias = "F")]
    F,
}


impl OrbitalType {
    /// Whether an `nlm` label from vasprun.xml belongs to this channel.
    ///
    /// VASP labels the dx2-y2 orbital as `x2-y2`, and LORBIT = 10 writes the bare `s`, `p`, `d`
    /// labels instead of the lm-decomposed ones.
    pub fn owns(&self, label: &str) -> bool {
        let label = label.trim().to_ascii_lowercase();
        match self {
            OrbitalType::S => label == "s",
            OrbitalType::P => label.starts_with('p'),
            OrbitalType::D => label.starts_with('d') || label == "x2-y2",
            OrbitalType::F => label.starts_with('f'),
        }
    }
}


impl std::fmt::Display for OrbitalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrbitalType::S => "s",
            OrbitalType::P => "p",
            OrbitalType::D => "d",
            OrbitalType::F => "f",
        };
        write!(f, "{}", s)
    }
}


/// Converts one site index counting from 1 into a zero-based index.
///
/// Negative indices count from the tail, `-1` means the last site. Zero is rejected.
pub fn index_transform(i: i32, len: usize) -> Result<usize> {
    let n = len as i32;
    if i == 0 || i > n || i < -n {
        bail!("Site index {} out of range, the structure contains {} sites (indices count from 1)", i, len);
    }

    Ok(if i < 0 {
        (i + n) as usize
    } else {
        (i - 1) as usize
    })
}
