//! Per-event views over a [`Tree`](crate::tree::Tree): attribute-style field
//! access, particle collections and common kinematics.

use pico_core::{Error, Result};

use crate::tree::{Cell, Column, Tree};

/// Massless-safe four-vector in `(px, py, pz, E)` representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FourVector {
    /// x momentum component.
    pub px: f64,
    /// y momentum component.
    pub py: f64,
    /// z momentum component.
    pub pz: f64,
    /// Energy.
    pub e: f64,
}

impl FourVector {
    /// Build from collider coordinates.
    pub fn from_ptetaphim(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        FourVector { px, py, pz, e: (p2 + mass * mass).sqrt() }
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        (self.px * self.px + self.py * self.py).sqrt()
    }

    /// Invariant mass; negative arguments clamp to zero.
    pub fn mass(&self) -> f64 {
        let m2 = self.e * self.e - (self.px * self.px + self.py * self.py + self.pz * self.pz);
        m2.max(0.0).sqrt()
    }
}

impl std::ops::Add for FourVector {
    type Output = FourVector;
    fn add(self, rhs: FourVector) -> FourVector {
        FourVector {
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
            e: self.e + rhs.e,
        }
    }
}

/// Wrap an azimuthal difference into `(-π, π]`.
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let mut dphi = phi1 - phi2;
    while dphi > std::f64::consts::PI {
        dphi -= 2.0 * std::f64::consts::PI;
    }
    while dphi <= -std::f64::consts::PI {
        dphi += 2.0 * std::f64::consts::PI;
    }
    dphi
}

/// Angular distance in the `(η, φ)` plane.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    (deta * deta + dphi * dphi).sqrt()
}

/// Read-only view of one event of a tree.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    tree: &'a Tree,
    index: usize,
}

impl<'a> Event<'a> {
    /// View event `index` of `tree`.
    pub fn new(tree: &'a Tree, index: usize) -> Result<Self> {
        if index as u64 >= tree.nevents() {
            return Err(Error::EventFile(format!(
                "event index {} out of range for tree '{}' with {} events",
                index,
                tree.name,
                tree.nevents()
            )));
        }
        Ok(Event { tree, index })
    }

    /// Event index within the tree.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Scalar field as `f64` (integers coerce).
    pub fn f64(&self, branch: &str) -> Result<f64> {
        match self.tree.branch(branch)? {
            Column::F64(v) => Ok(v[self.index]),
            Column::I64(v) => Ok(v[self.index] as f64),
            _ => Err(Error::EventFile(format!("branch '{branch}' is jagged, expected scalar"))),
        }
    }

    /// Scalar field as `i64`.
    pub fn i64(&self, branch: &str) -> Result<i64> {
        match self.tree.branch(branch)? {
            Column::I64(v) => Ok(v[self.index]),
            Column::F64(v) => Ok(v[self.index] as i64),
            _ => Err(Error::EventFile(format!("branch '{branch}' is jagged, expected scalar"))),
        }
    }

    /// The tree this event belongs to.
    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    /// Raw field value of any kind, e.g. for copying branches through to an
    /// output tree.
    pub fn cell(&self, branch: &str) -> Result<Cell> {
        Ok(match self.tree.branch(branch)? {
            Column::F64(v) => Cell::F64(v[self.index]),
            Column::I64(v) => Cell::I64(v[self.index]),
            Column::JaggedF64(v) => Cell::VecF64(v[self.index].clone()),
            Column::JaggedI64(v) => Cell::VecI64(v[self.index].clone()),
        })
    }

    /// Jagged field as a slice of `f64`.
    pub fn vec_f64(&self, branch: &str) -> Result<&'a [f64]> {
        match self.tree.branch(branch)? {
            Column::JaggedF64(v) => Ok(&v[self.index]),
            _ => Err(Error::EventFile(format!("branch '{branch}' is not a jagged f64 column"))),
        }
    }

    /// Length of collection `name`: the companion scalar `n<name>` when
    /// present, otherwise the length of any `<name>_*` jagged branch.
    pub fn ncoll(&self, name: &str) -> Result<usize> {
        let counter = format!("n{name}");
        if self.tree.has_branch(&counter) {
            return Ok(self.i64(&counter)?.max(0) as usize);
        }
        let prefix = format!("{name}_");
        for b in self.tree.branch_names() {
            if b.starts_with(&prefix)
                && let Ok(Column::JaggedF64(v)) = self.tree.branch(b)
            {
                return Ok(v[self.index].len());
            }
        }
        Err(Error::EventFile(format!("no collection '{name}' in tree '{}'", self.tree.name)))
    }

    /// Iterate the particle views of collection `name` (e.g. `Tau`, `Muon`).
    pub fn collection(&self, name: &'a str) -> Result<Vec<ParticleView<'a>>> {
        let n = self.ncoll(name)?;
        Ok((0..n).map(|i| ParticleView { tree: self.tree, coll: name, event: self.index, obj: i }).collect())
    }
}

/// One object of a per-event collection, bundling its `<coll>_<field>`
/// branches.
#[derive(Debug, Clone, Copy)]
pub struct ParticleView<'a> {
    tree: &'a Tree,
    coll: &'a str,
    event: usize,
    obj: usize,
}

impl ParticleView<'_> {
    /// Object index within its collection.
    pub fn index(&self) -> usize {
        self.obj
    }

    /// Read a per-object field, e.g. `get("pt")` reads `Tau_pt[obj]`.
    pub fn get(&self, field: &str) -> Result<f64> {
        let branch = format!("{}_{}", self.coll, field);
        match self.tree.branch(&branch)? {
            Column::JaggedF64(v) => {
                v[self.event].get(self.obj).copied().ok_or_else(|| {
                    Error::EventFile(format!("object index {} out of range in '{branch}'", self.obj))
                })
            }
            Column::JaggedI64(v) => {
                v[self.event].get(self.obj).map(|&x| x as f64).ok_or_else(|| {
                    Error::EventFile(format!("object index {} out of range in '{branch}'", self.obj))
                })
            }
            _ => Err(Error::EventFile(format!("branch '{branch}' is not jagged"))),
        }
    }

    /// Integer field (identification bitmasks, charges).
    pub fn get_i64(&self, field: &str) -> Result<i64> {
        let branch = format!("{}_{}", self.coll, field);
        match self.tree.branch(&branch)? {
            Column::JaggedI64(v) => {
                v[self.event].get(self.obj).copied().ok_or_else(|| {
                    Error::EventFile(format!("object index {} out of range in '{branch}'", self.obj))
                })
            }
            Column::JaggedF64(v) => {
                v[self.event].get(self.obj).map(|&x| x as i64).ok_or_else(|| {
                    Error::EventFile(format!("object index {} out of range in '{branch}'", self.obj))
                })
            }
            _ => Err(Error::EventFile(format!("branch '{branch}' is not jagged"))),
        }
    }

    /// Transverse momentum.
    pub fn pt(&self) -> Result<f64> {
        self.get("pt")
    }

    /// Pseudorapidity.
    pub fn eta(&self) -> Result<f64> {
        self.get("eta")
    }

    /// Azimuthal angle.
    pub fn phi(&self) -> Result<f64> {
        self.get("phi")
    }

    /// Four-vector from the standard `pt/eta/phi/mass` fields.
    pub fn p4(&self) -> Result<FourVector> {
        Ok(FourVector::from_ptetaphim(
            self.get("pt")?,
            self.get("eta")?,
            self.get("phi")?,
            self.get("mass")?,
        ))
    }

    /// ΔR to another object.
    pub fn delta_r(&self, other: &ParticleView<'_>) -> Result<f64> {
        Ok(delta_r(self.eta()?, self.phi()?, other.eta()?, other.phi()?))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::tree::Cell;

    fn demo_tree() -> Tree {
        let mut tree = Tree::new("Events");
        tree.declare("nMuon", Column::I64(Vec::new())).unwrap();
        tree.declare("Muon_pt", Column::JaggedF64(Vec::new())).unwrap();
        tree.declare("Muon_eta", Column::JaggedF64(Vec::new())).unwrap();
        tree.declare("Muon_phi", Column::JaggedF64(Vec::new())).unwrap();
        tree.declare("Muon_mass", Column::JaggedF64(Vec::new())).unwrap();
        tree.declare("Muon_charge", Column::JaggedI64(Vec::new())).unwrap();
        tree.declare("met", Column::F64(Vec::new())).unwrap();
        let mut row = BTreeMap::new();
        row.insert("nMuon".to_string(), Cell::I64(2));
        row.insert("Muon_pt".to_string(), Cell::VecF64(vec![50.0, 30.0]));
        row.insert("Muon_eta".to_string(), Cell::VecF64(vec![0.5, -1.2]));
        row.insert("Muon_phi".to_string(), Cell::VecF64(vec![0.0, std::f64::consts::PI / 2.0]));
        row.insert("Muon_mass".to_string(), Cell::VecF64(vec![0.105, 0.105]));
        row.insert("Muon_charge".to_string(), Cell::VecI64(vec![1, -1]));
        row.insert("met".to_string(), Cell::F64(42.0));
        tree.fill(&row).unwrap();
        tree
    }

    #[test]
    fn scalar_and_collection_access() {
        let tree = demo_tree();
        let event = Event::new(&tree, 0).unwrap();
        assert_eq!(event.f64("met").unwrap(), 42.0);
        let muons = event.collection("Muon").unwrap();
        assert_eq!(muons.len(), 2);
        assert_eq!(muons[0].pt().unwrap(), 50.0);
        assert_eq!(muons[1].get_i64("charge").unwrap(), -1);
    }

    #[test]
    fn missing_branch_is_an_error() {
        let tree = demo_tree();
        let event = Event::new(&tree, 0).unwrap();
        assert!(event.f64("mt_1").is_err());
        assert!(event.collection("Tau").is_err());
    }

    #[test]
    fn kinematics() {
        let tree = demo_tree();
        let event = Event::new(&tree, 0).unwrap();
        let muons = event.collection("Muon").unwrap();
        let dr = muons[0].delta_r(&muons[1]).unwrap();
        let expect = delta_r(0.5, 0.0, -1.2, std::f64::consts::PI / 2.0);
        assert!((dr - expect).abs() < 1e-12);

        let z = muons[0].p4().unwrap() + muons[1].p4().unwrap();
        assert!(z.mass() > 0.0);
        assert!(z.pt() > 0.0);
    }

    #[test]
    fn delta_phi_wraps() {
        assert!((delta_phi(3.0, -3.0) - (6.0 - 2.0 * std::f64::consts::PI)).abs() < 1e-12);
    }
}
