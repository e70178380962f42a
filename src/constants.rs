//! Physical constants in the unit system of the transport problem:
//! lengths in cm, times in shakes, energies in jerks, temperatures in keV.

/// Speed of light [cm/shake].
pub const C: f64 = 299.792;

/// Radiation constant [jerks/(cm^3 keV^4)].
pub const A: f64 = 0.01372;
