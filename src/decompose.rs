//! Decomposition drivers that finish mesh setup without the external
//! graph partitioner.
//!
//! The cube method here is the communication-free block split: the even
//! slices the constructor generated are made final by pushing identity
//! maps through the full two-phase remap, which tags the real processor
//! faces and fills the boundary-element list. Replicated mode gives
//! every rank the whole grid, so no face is ever a processor boundary.
//! Graph partitioning (ParMETIS) lives in an external driver and is
//! reported as unsupported.

use crate::element::Direction;
use crate::input::{DdMode, DecompMethod, Input};
use crate::mesh::Mesh;
use log::info;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("{0:?} decomposition requires the external partitioning driver")]
    Unsupported(DecompMethod),
}

/// Mirrors the driver entry point: replicated runs ignore the
/// decomposition method, everything else runs the chosen partitioner.
pub fn prepare(mesh: &mut Mesh, input: &Input) -> Result<(), DecomposeError> {
    if input.dd_mode == DdMode::Replicated {
        replicate(mesh);
        Ok(())
    } else {
        decompose(mesh, input.decomposition, input.grip_size)
    }
}

/// Finalizes mesh ownership with the chosen method. `grip_size` is the
/// granularity unit of the external partitioner and is opaque here.
pub fn decompose(
    mesh: &mut Mesh,
    method: DecompMethod,
    _grip_size: u32,
) -> Result<(), DecomposeError> {
    match method {
        DecompMethod::Cube => {
            block_decompose(mesh);
            Ok(())
        }
        DecompMethod::Parmetis => Err(DecomposeError::Unsupported(method)),
    }
}

/// Gives every rank the full grid: all reads stay local and the request
/// engine never runs.
pub fn replicate(mesh: &mut Mesh) {
    mesh.adopt_full_window();
    info!("rank {} replicated the full mesh", mesh.rank());
}

fn block_decompose(mesh: &mut Mesh) {
    let n_rank = mesh.n_rank() as u64;
    let n_global = u64::from(mesh.n_global_elements());
    let bounds: Vec<u32> = (0..=n_rank).map(|r| (r * n_global / n_rank) as u32).collect();
    let start = bounds[mesh.rank()];
    let end = bounds[mesh.rank() + 1];
    mesh.set_global_bounds(start, end);
    mesh.set_off_rank_bounds(bounds);

    // The block split never renumbers, so both remap tables are identity
    // maps: the local one over this rank's ids, the off-rank one over
    // every neighbor id reaching outside the owned range.
    let local_map = mesh.global_index_map();
    let mut off_map = BTreeMap::new();
    for i in 0..mesh.n_local_elements() {
        for d in Direction::ALL {
            let neighbor = mesh.element(i).neighbor(d);
            if neighbor < start || neighbor >= end {
                off_map.insert(neighbor, neighbor);
            }
        }
    }
    let mut remap_flag = vec![[false; 6]; mesh.n_local_elements()];
    mesh.set_indices(&off_map, &mut remap_flag);
    mesh.set_local_indices(&local_map);
    mesh.update_mesh();
    info!(
        "rank {} owns elements [{}, {}) after block decomposition",
        mesh.rank(),
        start,
        end
    );
}
