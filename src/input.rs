//! Problem configuration.
//!
//! An [`Input`] holds every knob the mesh needs: grid extents and
//! spacing, the initial boundary settings, material and opacity models,
//! time-step controls, and the domain-decomposition choices. Decks load
//! from JSON and are validated before a mesh is built from them.

use crate::element::BcType;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// How transport work and mesh data are spread over the ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DdMode {
    ParticlePass,
    CellPass,
    CellPassRma,
    Replicated,
}

/// Which partitioner produces the final ownership ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompMethod {
    Parmetis,
    Cube,
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot read input deck")]
    Io(#[from] std::io::Error),
    #[error("cannot parse input deck")]
    Parse(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    Invalid(String),
}

/// A full problem description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
    /// Grid extents in elements.
    pub ngx: u32,
    pub ngy: u32,
    pub ngz: u32,
    /// Element spacing per axis [cm].
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Initial boundary setting per face in the order {X+, X-, Y+, Y-,
    /// Z+, Z-}. Only vacuum and reflect are valid at input time; element
    /// and processor faces are derived.
    pub bc: [BcType; 6],
    /// Heat capacity [jerks/(cm^3 keV)].
    pub cv: f64,
    /// Density [g/cm^3].
    pub rho: f64,
    /// Initial material temperature [keV].
    pub initial_t_e: f64,
    /// Initial radiation temperature [keV].
    pub initial_t_r: f64,
    /// Absorption opacity model `op_a + op_b * T^op_c` [1/cm].
    pub op_a: f64,
    pub op_b: f64,
    pub op_c: f64,
    /// Scattering opacity [1/cm].
    pub op_s: f64,
    /// First time-step length [shakes].
    pub dt: f64,
    /// Multiplicative step growth per step.
    pub dt_mult: f64,
    /// End time [shakes].
    pub t_stop: f64,
    pub dd_mode: DdMode,
    pub decomposition: DecompMethod,
    /// Granularity unit of the external partitioner; opaque to the mesh.
    pub grip_size: u32,
    /// Remote cache capacity in elements.
    pub max_map_size: usize,
}

impl Input {
    /// Loads and validates a JSON input deck.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Input, InputError> {
        let file = File::open(path)?;
        let input: Input = serde_json::from_reader(BufReader::new(file))?;
        input.validate()?;
        Ok(input)
    }

    /// Checks the physical bounds the mesh relies on.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.ngx == 0 || self.ngy == 0 || self.ngz == 0 {
            return Err(InputError::Invalid("grid extents must be positive".into()));
        }
        if !(self.dx > 0.0 && self.dy > 0.0 && self.dz > 0.0) {
            return Err(InputError::Invalid("element spacing must be positive".into()));
        }
        if !(self.cv > 0.0) {
            return Err(InputError::Invalid("heat capacity must be positive".into()));
        }
        if !(self.rho > 0.0) {
            return Err(InputError::Invalid("density must be positive".into()));
        }
        if self.initial_t_e < 0.0 || self.initial_t_r < 0.0 {
            return Err(InputError::Invalid("temperatures must be non-negative".into()));
        }
        if !(self.dt > 0.0) {
            return Err(InputError::Invalid("time step must be positive".into()));
        }
        if self.max_map_size == 0 {
            return Err(InputError::Invalid(
                "the remote cache needs at least one slot".into(),
            ));
        }
        for (face, bc) in self.bc.iter().enumerate() {
            if !matches!(bc, BcType::Vacuum | BcType::Reflect) {
                return Err(InputError::Invalid(format!(
                    "face {} must start as vacuum or reflect",
                    face
                )));
            }
        }
        Ok(())
    }
}
