//! The distributed mesh: a contiguous window of elements owned by this
//! rank, a bounded cache of fetched off-rank elements, and the request
//! engine that fills it.
//!
//! One `Mesh` exists per rank. The transport kernel reads elements by
//! global id through [`Mesh::get_element`]; an id that is neither local
//! nor cached comes back as `NotResident`, and the caller queues it with
//! [`Mesh::request_element`] and retries after the driver has run a
//! [`Mesh::progress`] cycle. All communication state advances
//! cooperatively inside `progress`; nothing in this module blocks the
//! rank. The mesh owns the cache, the engine, and the window outright:
//! the engine borrows the cache exclusively and the window shared for
//! the duration of a progress call, and there are no back-pointers
//! between the three.

use crate::constants::{A, C};
use crate::element::{BcType, Direction, Element};
use crate::error::MeshError;
use crate::input::Input;
use crate::message::Communicator;
use crate::partition::PartitionMap;
use crate::remote_cache::RemoteCache;
use crate::request::RequestEngine;
use crate::state::ImcState;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::mem;

/// Grid generation parameters, kept so replicated runs can regenerate
/// the full window.
#[derive(Clone)]
struct GridSpec {
    ngx: u32,
    ngy: u32,
    ngz: u32,
    dx: f64,
    dy: f64,
    dz: f64,
    bc: [BcType; 6],
    cv: f64,
    rho: f64,
    t_e: f64,
    t_r: f64,
}

impl GridSpec {
    /// Generates the elements with global ids in `[begin, end)`, walking
    /// the grid x-fastest and wiring every face to its grid neighbor or
    /// to the problem boundary.
    fn generate(&self, begin: u32, end: u32) -> Vec<Element> {
        let mut elements = Vec::with_capacity((end - begin) as usize);
        let mut g = 0u32;
        for k in 0..self.ngz {
            for j in 0..self.ngy {
                for i in 0..self.ngx {
                    if g >= begin && g < end {
                        let mut e = Element::new(
                            g,
                            (f64::from(i) * self.dx, f64::from(i + 1) * self.dx),
                            (f64::from(j) * self.dy, f64::from(j + 1) * self.dy),
                            (f64::from(k) * self.dz, f64::from(k + 1) * self.dz),
                            self.cv,
                            self.rho,
                            self.t_e,
                            self.t_r,
                        );
                        if i + 1 < self.ngx {
                            e.set_neighbor(Direction::XPos, g + 1);
                            e.set_bc(Direction::XPos, BcType::Element);
                        } else {
                            e.set_neighbor(Direction::XPos, g);
                            e.set_bc(Direction::XPos, self.bc[Direction::XPos.index()]);
                        }
                        if i > 0 {
                            e.set_neighbor(Direction::XNeg, g - 1);
                            e.set_bc(Direction::XNeg, BcType::Element);
                        } else {
                            e.set_neighbor(Direction::XNeg, g);
                            e.set_bc(Direction::XNeg, self.bc[Direction::XNeg.index()]);
                        }
                        if j + 1 < self.ngy {
                            e.set_neighbor(Direction::YPos, g + self.ngx);
                            e.set_bc(Direction::YPos, BcType::Element);
                        } else {
                            e.set_neighbor(Direction::YPos, g);
                            e.set_bc(Direction::YPos, self.bc[Direction::YPos.index()]);
                        }
                        if j > 0 {
                            e.set_neighbor(Direction::YNeg, g - self.ngx);
                            e.set_bc(Direction::YNeg, BcType::Element);
                        } else {
                            e.set_neighbor(Direction::YNeg, g);
                            e.set_bc(Direction::YNeg, self.bc[Direction::YNeg.index()]);
                        }
                        if k + 1 < self.ngz {
                            e.set_neighbor(Direction::ZPos, g + self.ngx * self.ngy);
                            e.set_bc(Direction::ZPos, BcType::Element);
                        } else {
                            e.set_neighbor(Direction::ZPos, g);
                            e.set_bc(Direction::ZPos, self.bc[Direction::ZPos.index()]);
                        }
                        if k > 0 {
                            e.set_neighbor(Direction::ZNeg, g - self.ngx * self.ngy);
                            e.set_bc(Direction::ZNeg, BcType::Element);
                        } else {
                            e.set_neighbor(Direction::ZNeg, g);
                            e.set_bc(Direction::ZNeg, self.bc[Direction::ZNeg.index()]);
                        }
                        elements.push(e);
                    }
                    g += 1;
                }
            }
        }
        elements
    }
}

pub struct Mesh {
    rank: usize,
    n_rank: usize,
    n_global: u32,
    on_rank_start: u32,
    on_rank_end: u32,
    elements: Vec<Element>,
    new_elements: Vec<Element>,
    removed_indices: Vec<usize>,
    boundary_elements: Vec<u32>,
    partition: PartitionMap,
    cache: RemoteCache,
    engine: RequestEngine,
    emission_e: Vec<f64>,
    census_e: Vec<f64>,
    source_e: Vec<f64>,
    op_a: f64,
    op_b: f64,
    op_c: f64,
    op_s: f64,
    total_photon_e: f64,
    grid: GridSpec,
}

impl Mesh {
    /// Builds this rank's share of the structured grid. Every rank walks
    /// the full grid and keeps the contiguous slice of an even split;
    /// decomposition later finalizes the slice and the ownership table.
    pub fn new(input: &Input, rank: usize, n_rank: usize) -> Self {
        let n_global = input.ngx * input.ngy * input.ngz;
        let grid = GridSpec {
            ngx: input.ngx,
            ngy: input.ngy,
            ngz: input.ngz,
            dx: input.dx,
            dy: input.dy,
            dz: input.dz,
            bc: input.bc,
            cv: input.cv,
            rho: input.rho,
            t_e: input.initial_t_e,
            t_r: input.initial_t_r,
        };
        let partition = PartitionMap::even(rank, n_rank, n_global);
        let begin = partition.start_of(rank);
        let end = partition.start_of(rank + 1);
        let elements = grid.generate(begin, end);
        let n_local = elements.len();
        Self {
            rank,
            n_rank,
            n_global,
            on_rank_start: begin,
            on_rank_end: end,
            elements,
            new_elements: Vec::new(),
            removed_indices: Vec::new(),
            boundary_elements: Vec::new(),
            partition,
            cache: RemoteCache::new(input.max_map_size),
            engine: RequestEngine::new(n_rank.saturating_sub(1)),
            emission_e: vec![0.0; n_local],
            census_e: vec![0.0; n_local],
            source_e: vec![0.0; n_local],
            op_a: input.op_a,
            op_b: input.op_b,
            op_c: input.op_c,
            op_s: input.op_s,
            total_photon_e: 0.0,
            grid,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_rank(&self) -> usize {
        self.n_rank
    }

    pub fn n_local_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn n_global_elements(&self) -> u32 {
        self.n_global
    }

    pub fn global_id(&self, local: usize) -> u32 {
        self.elements[local].id()
    }

    /// The element at a local window index.
    pub fn element(&self, local: usize) -> &Element {
        &self.elements[local]
    }

    /// The half-open global-id range owned by this rank.
    pub fn local_bounds(&self) -> (u32, u32) {
        (self.on_rank_start, self.on_rank_end)
    }

    pub fn total_photon_energy(&self) -> f64 {
        self.total_photon_e
    }

    pub fn emission_energy(&self) -> &[f64] {
        &self.emission_e
    }

    pub fn census_energy(&self) -> &[f64] {
        &self.census_e
    }

    pub fn source_energy(&self) -> &[f64] {
        &self.source_e
    }

    /// New ids recorded for every face the remap turned into a processor
    /// boundary.
    pub fn boundary_elements(&self) -> &[u32] {
        &self.boundary_elements
    }

    /// Admitted off-rank requests since the counter was last reported.
    pub fn off_rank_reads(&self) -> u32 {
        self.engine.off_rank_reads()
    }

    /// True when this rank owns `id`.
    pub fn is_local(&self, id: u32) -> bool {
        id >= self.on_rank_start && id < self.on_rank_end
    }

    /// The rank that owns `id`: this one, or the boundary-table owner.
    pub fn rank_of(&self, id: u32) -> usize {
        if self.is_local(id) {
            self.rank
        } else {
            self.partition.owner_of(id)
        }
    }

    /// True when `id` can be read without communication.
    pub fn is_resident(&self, id: u32) -> bool {
        self.is_local(id) || self.cache.contains(id)
    }

    /// Reads an element by global id: from the local window, else from
    /// the remote cache. A non-resident remote id is the one recoverable
    /// failure in the subsystem.
    pub fn get_element(&self, id: u32) -> Result<Element, MeshError> {
        if id >= self.n_global {
            return Err(MeshError::IdOutOfRange {
                id,
                n_global: self.n_global,
            });
        }
        if self.is_local(id) {
            Ok(self.elements[(id - self.on_rank_start) as usize])
        } else if let Some(elem) = self.cache.get(id) {
            Ok(*elem)
        } else {
            Err(MeshError::NotResident(id))
        }
    }

    /// Maps every current global id to its compacted id `i +
    /// on_rank_start`. Decomposition gathers these maps from all ranks to
    /// build the cross-rank and local remap tables.
    pub fn global_index_map(&self) -> BTreeMap<u32, u32> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id(), i as u32 + self.on_rank_start))
            .collect()
    }

    /// Installs the final global-id range owned by this rank.
    pub fn set_global_bounds(&mut self, start: u32, end: u32) {
        self.on_rank_start = start;
        self.on_rank_end = end;
    }

    /// Installs the rank-boundary table produced by decomposition.
    pub fn set_off_rank_bounds(&mut self, bounds: Vec<u32>) {
        self.partition = PartitionMap::new(self.rank, bounds);
    }

    /// First remap phase: neighbors that decomposition moved across rank
    /// boundaries are rewritten to their new ids and tagged processor
    /// faces, and the new ids are recorded in the boundary-element list.
    /// `remap_flag` persists between calls, so applying the same map
    /// twice leaves the mesh unchanged. Must run before
    /// [`Mesh::set_local_indices`]: processor faces have to be
    /// identified while cross-rank targets are still distinguishable
    /// from local ones.
    pub fn set_indices(&mut self, off_map: &BTreeMap<u32, u32>, remap_flag: &mut [[bool; 6]]) {
        for (i, elem) in self.elements.iter_mut().enumerate() {
            for d in Direction::ALL {
                if remap_flag[i][d.index()] {
                    continue;
                }
                if let Some(&new_id) = off_map.get(&elem.neighbor(d)) {
                    remap_flag[i][d.index()] = true;
                    elem.set_neighbor(d, new_id);
                    elem.set_bc(d, BcType::Processor);
                    self.boundary_elements.push(new_id);
                }
            }
        }
    }

    /// Second remap phase: compacts this rank's ids to `i +
    /// on_rank_start` and rewrites every non-processor neighbor through
    /// the local map. Self-loop neighbors on vacuum and reflect faces
    /// follow their element to its new id.
    pub fn set_local_indices(&mut self, local_map: &BTreeMap<u32, u32>) {
        let start = self.on_rank_start;
        for (i, elem) in self.elements.iter_mut().enumerate() {
            elem.set_id(i as u32 + start);
            for d in Direction::ALL {
                if elem.bc(d) == BcType::Processor {
                    continue;
                }
                if let Some(&new_id) = local_map.get(&elem.neighbor(d)) {
                    elem.set_neighbor(d, new_id);
                }
            }
        }
    }

    /// Stages an element migrating onto this rank during decomposition.
    pub fn add_element(&mut self, elem: Element) {
        self.new_elements.push(elem);
    }

    /// Stages the removal of the element at window index `local`.
    pub fn remove_element(&mut self, local: usize) {
        self.removed_indices.push(local);
    }

    /// Applies staged adds and removals, re-sorts the window by global
    /// id, and resizes the per-step energy vectors to the new count.
    pub fn update_mesh(&mut self) {
        let removed = mem::take(&mut self.removed_indices);
        let mut window: Vec<Element> = self
            .elements
            .drain(..)
            .enumerate()
            .filter(|(i, _)| !removed.contains(i))
            .map(|(_, e)| e)
            .collect();
        window.append(&mut self.new_elements);
        window.sort_by_key(|e| e.id());
        self.elements = window;
        let n_local = self.elements.len();
        self.emission_e = vec![0.0; n_local];
        self.census_e = vec![0.0; n_local];
        self.source_e = vec![0.0; n_local];
    }

    /// Replaces the window with the full grid; used by replicated runs
    /// where every rank owns everything.
    pub(crate) fn adopt_full_window(&mut self) {
        self.elements = self.grid.generate(0, self.n_global);
        self.on_rank_start = 0;
        self.on_rank_end = self.n_global;
        let mut bounds = vec![self.n_global; self.n_rank + 1];
        bounds[0] = 0;
        self.partition = PartitionMap::new(self.rank, bounds);
        self.update_mesh();
    }

    /// Queues a fetch for an off-rank element. Requests for ids already
    /// in flight or resident are suppressed; every admitted id counts
    /// one off-rank read.
    pub fn request_element(&mut self, id: u32) -> Result<(), MeshError> {
        if id >= self.n_global {
            return Err(MeshError::IdOutOfRange {
                id,
                n_global: self.n_global,
            });
        }
        if self.is_local(id) {
            return Ok(());
        }
        if !self.cache.mark_requested(id) {
            return Ok(());
        }
        let owner = self.partition.owner_of(id);
        let peer_local = id - self.partition.start_of(owner);
        debug!("rank {} requests element {} from rank {}", self.rank, id, owner);
        self.engine.stage(self.partition.peer_index(owner), peer_local);
        Ok(())
    }

    /// Advances every peer exchange one cooperative step. Returns
    /// whether any new remote element became resident, which tells the
    /// driver to retry queued transport work.
    pub fn progress<Comm: Communicator>(&mut self, comm: &mut Comm) -> Result<bool, MeshError> {
        self.engine
            .progress(comm, &self.partition, &self.elements, &mut self.cache)
    }

    /// Drops all fetched elements and request records at a step
    /// boundary. The driver drains the exchanges first; purging with a
    /// fetch mid-flight is a driver error.
    pub fn purge_working_mesh(&mut self) {
        debug_assert!(self.engine.is_quiescent());
        self.cache.purge();
    }

    /// Start-of-step energy fields: derives the opacities and the Fleck
    /// factor for every local element and fills the emission, census,
    /// and source energy vectors. Census energy exists only on the first
    /// step; afterwards it is carried by surviving photons.
    pub fn calculate_photon_energy(&mut self, state: &mut ImcState) {
        self.total_photon_e = 0.0;
        let dt = state.dt();
        let step = state.step();
        let mut tot_emission = 0.0;
        let mut tot_census = 0.0;
        let mut tot_source = 0.0;
        let mut pre_mat = 0.0;
        for (i, e) in self.elements.iter_mut().enumerate() {
            let vol = e.volume();
            let cv = e.cv();
            let t = e.t_e();
            let tr = e.t_r();
            let ts = e.t_s();
            let op_a = self.op_a + self.op_b * t.powf(self.op_c);
            let op_s = self.op_s;
            let f = 1.0 / (1.0 + dt * op_a * C * (4.0 * A * t.powi(3) / cv));
            e.set_op_a(op_a);
            e.set_op_s(op_s);
            e.set_f(f);
            self.emission_e[i] = dt * vol * f * op_a * A * C * t.powi(4);
            self.census_e[i] = if step == 1 { vol * A * tr.powi(4) } else { 0.0 };
            self.source_e[i] = dt * op_a * A * C * ts.powi(4);
            pre_mat += t * cv * vol;
            tot_emission += self.emission_e[i];
            tot_census += self.census_e[i];
            tot_source += self.source_e[i];
            self.total_photon_e += self.emission_e[i] + self.census_e[i] + self.source_e[i];
        }
        state.set_pre_mat_e(pre_mat);
        state.set_emission_e(tot_emission);
        state.set_source_e(tot_source);
        if step == 1 {
            state.set_pre_census_e(tot_census);
        }
    }

    /// End-of-step temperature update from the globally indexed absorbed
    /// energy tally. Zeroes the tally for the next step and moves the
    /// off-rank read count into the state. A negative updated
    /// temperature means the inputs were ill-posed; it is reported, not
    /// repaired.
    pub fn update_temperature(&mut self, abs_e: &mut [f64], state: &mut ImcState) {
        let mut total_abs = 0.0;
        let mut post_mat = 0.0;
        for (i, e) in self.elements.iter_mut().enumerate() {
            let vol = e.volume();
            let cv = e.cv();
            let rho = e.rho();
            let absorbed = abs_e[i + self.on_rank_start as usize];
            let t_new = e.t_e() + (absorbed - self.emission_e[i]) / (cv * vol * rho);
            if t_new < 0.0 {
                warn!("element {} updated to negative temperature {:.6e}", e.id(), t_new);
            }
            e.set_t_e(t_new);
            total_abs += absorbed;
            post_mat += t_new * cv * vol;
        }
        for x in abs_e.iter_mut() {
            *x = 0.0;
        }
        state.set_absorbed_e(total_abs);
        state.set_post_mat_e(post_mat);
        state.set_off_rank_reads(self.engine.take_off_rank_reads());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::A;
    use crate::decompose;
    use crate::input::{DdMode, DecompMethod};
    use crate::message::{ChannelCommunicator, NullCommunicator};

    fn sample_input(ngx: u32, ngy: u32, ngz: u32, max_map_size: usize) -> Input {
        Input {
            ngx,
            ngy,
            ngz,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
            bc: [BcType::Vacuum; 6],
            cv: 1.0,
            rho: 1.0,
            initial_t_e: 1.0,
            initial_t_r: 1.0,
            op_a: 1.0,
            op_b: 0.0,
            op_c: 0.0,
            op_s: 0.0,
            dt: 0.01,
            dt_mult: 1.0,
            t_stop: 1.0,
            dd_mode: DdMode::CellPass,
            decomposition: DecompMethod::Cube,
            grip_size: 1,
            max_map_size,
        }
    }

    fn two_rank_setup(
        ngx: u32,
        max_map_size: usize,
    ) -> (Vec<Mesh>, Vec<ChannelCommunicator>) {
        let input = sample_input(ngx, 1, 1, max_map_size);
        let comms = ChannelCommunicator::bus(2);
        let mut meshes: Vec<Mesh> = (0..2).map(|r| Mesh::new(&input, r, 2)).collect();
        for mesh in &mut meshes {
            decompose::decompose(mesh, DecompMethod::Cube, input.grip_size).unwrap();
        }
        (meshes, comms)
    }

    fn run_exchange(meshes: &mut [Mesh], comms: &mut [ChannelCommunicator], rounds: usize) {
        for _ in 0..rounds {
            for (mesh, comm) in meshes.iter_mut().zip(comms.iter_mut()) {
                mesh.progress(comm).unwrap();
            }
        }
    }

    #[test]
    fn single_rank_grid_wires_neighbors_and_boundaries() {
        let input = sample_input(2, 1, 1, 10);
        let mut mesh = Mesh::new(&input, 0, 1);
        assert_eq!(mesh.n_local_elements(), 2);

        let e0 = mesh.get_element(0).unwrap();
        assert_eq!(e0.neighbor(Direction::XPos), 1);
        assert_eq!(e0.bc(Direction::XPos), BcType::Element);
        assert_eq!(e0.neighbor(Direction::XNeg), 0);
        assert_eq!(e0.bc(Direction::XNeg), BcType::Vacuum);

        let e1 = mesh.get_element(1).unwrap();
        assert_eq!(e1.neighbor(Direction::XPos), 1);
        assert_eq!(e1.bc(Direction::XPos), BcType::Vacuum);

        // no peers, so a progress cycle moves nothing
        let mut comm = NullCommunicator::new();
        assert!(!mesh.progress(&mut comm).unwrap());
    }

    #[test]
    fn grid_generation_splits_evenly_across_ranks() {
        let input = sample_input(3, 2, 1, 10);
        let mesh0 = Mesh::new(&input, 0, 2);
        let mesh1 = Mesh::new(&input, 1, 2);
        assert_eq!(mesh0.local_bounds(), (0, 3));
        assert_eq!(mesh1.local_bounds(), (3, 6));
        assert_eq!(mesh0.n_local_elements(), 3);
        assert_eq!(mesh1.n_local_elements(), 3);
        assert_eq!(mesh1.global_id(0), 3);
        // interior face in y crosses the split
        assert_eq!(mesh0.element(0).neighbor(Direction::YPos), 3);
        assert_eq!(mesh0.element(0).bc(Direction::YPos), BcType::Element);
    }

    #[test]
    fn out_of_range_ids_are_reported() {
        let input = sample_input(2, 1, 1, 10);
        let mut mesh = Mesh::new(&input, 0, 1);
        assert!(matches!(
            mesh.get_element(2),
            Err(MeshError::IdOutOfRange { id: 2, .. })
        ));
        assert!(matches!(
            mesh.request_element(9),
            Err(MeshError::IdOutOfRange { id: 9, .. })
        ));
    }

    #[test]
    fn remap_marks_processor_faces_once() {
        let input = sample_input(2, 1, 1, 10);
        let mut mesh = Mesh::new(&input, 0, 2); // owns element 0 only
        let mut off_map = BTreeMap::new();
        off_map.insert(1, 1);
        let mut remap_flag = vec![[false; 6]; 1];

        mesh.set_indices(&off_map, &mut remap_flag);
        assert_eq!(mesh.element(0).bc(Direction::XPos), BcType::Processor);
        assert_eq!(mesh.element(0).neighbor(Direction::XPos), 1);
        assert_eq!(mesh.boundary_elements(), &[1]);

        // applying the same map again is a no-op
        mesh.set_indices(&off_map, &mut remap_flag);
        assert_eq!(mesh.boundary_elements(), &[1]);
    }

    #[test]
    fn local_remap_compacts_ids_and_keeps_self_loops() {
        let input = sample_input(2, 1, 1, 10);
        let mut mesh = Mesh::new(&input, 0, 1);
        mesh.set_global_bounds(10, 12);
        let mut local_map = BTreeMap::new();
        local_map.insert(0, 10);
        local_map.insert(1, 11);
        mesh.set_local_indices(&local_map);

        assert_eq!(mesh.global_id(0), 10);
        assert_eq!(mesh.global_id(1), 11);
        assert_eq!(mesh.element(0).neighbor(Direction::XPos), 11);
        // the vacuum self-loop followed its element
        assert_eq!(mesh.element(1).neighbor(Direction::XPos), 11);
        assert_eq!(mesh.element(1).bc(Direction::XPos), BcType::Vacuum);
    }

    #[test]
    fn update_mesh_applies_staged_migration() {
        let input = sample_input(4, 1, 1, 10);
        let mut mesh = Mesh::new(&input, 0, 1);
        mesh.remove_element(0);
        mesh.add_element(Element::new(
            7,
            (0.0, 1.0),
            (0.0, 1.0),
            (0.0, 1.0),
            1.0,
            1.0,
            1.0,
            1.0,
        ));
        mesh.update_mesh();
        assert_eq!(mesh.n_local_elements(), 4);
        let ids: Vec<u32> = (0..4).map(|i| mesh.global_id(i)).collect();
        assert_eq!(ids, vec![1, 2, 3, 7]);
        assert_eq!(mesh.emission_energy().len(), 4);
    }

    #[test]
    fn two_rank_fetch_makes_remote_element_resident() {
        let (mut meshes, mut comms) = two_rank_setup(2, 10);
        assert_eq!(meshes[0].element(0).bc(Direction::XPos), BcType::Processor);
        assert_eq!(meshes[0].element(0).neighbor(Direction::XPos), 1);
        assert_eq!(meshes[0].rank_of(1), 1);

        assert!(matches!(
            meshes[0].get_element(1),
            Err(MeshError::NotResident(1))
        ));
        meshes[0].request_element(1).unwrap();
        assert_eq!(meshes[0].off_rank_reads(), 1);

        run_exchange(&mut meshes, &mut comms, 8);
        assert!(meshes[0].is_resident(1));
        let fetched = meshes[0].get_element(1).unwrap();
        assert_eq!(fetched.id(), 1);
        assert_eq!(fetched, meshes[1].get_element(1).unwrap());
    }

    #[test]
    fn duplicate_requests_are_suppressed() {
        let (mut meshes, _comms) = two_rank_setup(2, 10);
        meshes[0].request_element(1).unwrap();
        meshes[0].request_element(1).unwrap();
        assert_eq!(meshes[0].off_rank_reads(), 1);
        // local ids are never admitted
        meshes[0].request_element(0).unwrap();
        assert_eq!(meshes[0].off_rank_reads(), 1);
    }

    #[test]
    fn eviction_keeps_the_cache_bounded_and_re_requestable() {
        let (mut meshes, mut comms) = two_rank_setup(4, 1);
        assert_eq!(meshes[0].local_bounds(), (0, 2));
        assert_eq!(meshes[1].local_bounds(), (2, 4));

        meshes[0].request_element(2).unwrap();
        run_exchange(&mut meshes, &mut comms, 8);
        assert!(meshes[0].is_resident(2));

        meshes[0].request_element(3).unwrap();
        run_exchange(&mut meshes, &mut comms, 8);
        assert!(meshes[0].is_resident(3));
        assert!(!meshes[0].is_resident(2));

        // the evicted element can be requested again
        meshes[0].request_element(2).unwrap();
        assert_eq!(meshes[0].off_rank_reads(), 3);
        run_exchange(&mut meshes, &mut comms, 8);
        assert!(meshes[0].is_resident(2));
    }

    #[test]
    fn purge_then_refetch_restores_residency() {
        let (mut meshes, mut comms) = two_rank_setup(2, 10);
        meshes[0].request_element(1).unwrap();
        run_exchange(&mut meshes, &mut comms, 8);
        assert!(meshes[0].is_resident(1));

        meshes[0].purge_working_mesh();
        assert!(!meshes[0].is_resident(1));

        meshes[0].request_element(1).unwrap();
        run_exchange(&mut meshes, &mut comms, 8);
        assert!(meshes[0].is_resident(1));
    }

    #[test]
    fn census_energy_exists_only_on_the_first_step() {
        let input = sample_input(2, 1, 1, 10);
        let mut mesh = Mesh::new(&input, 0, 1);
        let mut state = ImcState::new(&input);

        mesh.calculate_photon_energy(&mut state);
        for &census in mesh.census_energy() {
            assert!((census - A).abs() < 1e-15); // vol * a * T_r^4 with unit volume and temperature
        }
        assert!((state.pre_census_e() - 2.0 * A).abs() < 1e-15);
        let vector_sum: f64 = mesh
            .emission_energy()
            .iter()
            .chain(mesh.census_energy())
            .chain(mesh.source_energy())
            .sum();
        assert!((mesh.total_photon_energy() - vector_sum).abs() < 1e-15);

        state.next_time_step();
        mesh.calculate_photon_energy(&mut state);
        assert!(mesh.census_energy().iter().all(|&census| census == 0.0));
    }

    #[test]
    fn temperature_update_balances_absorbed_and_emitted_energy() {
        let input = sample_input(1, 1, 1, 10);
        let mut mesh = Mesh::new(&input, 0, 1);
        let mut state = ImcState::new(&input);
        mesh.calculate_photon_energy(&mut state);
        let emitted = mesh.emission_energy()[0];
        assert!(emitted > 0.0);

        let mut abs_e = vec![0.3];
        mesh.update_temperature(&mut abs_e, &mut state);

        let expected = 1.0 + (0.3 - emitted);
        let updated = mesh.get_element(0).unwrap().t_e();
        assert!((updated - expected).abs() < 1e-12);
        assert!((state.absorbed_e() - 0.3).abs() < 1e-15);
        assert!((state.post_mat_e() - expected).abs() < 1e-12);
        // the tally is zeroed for the next step
        assert!(abs_e.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn off_rank_reads_report_through_the_state() {
        let (mut meshes, mut comms) = two_rank_setup(2, 10);
        let input = sample_input(2, 1, 1, 10);
        let mut state = ImcState::new(&input);

        meshes[0].request_element(1).unwrap();
        run_exchange(&mut meshes, &mut comms, 8);

        let mut abs_e = vec![0.0, 0.0];
        meshes[0].calculate_photon_energy(&mut state);
        meshes[0].update_temperature(&mut abs_e, &mut state);
        assert_eq!(state.off_rank_reads(), 1);
        assert_eq!(meshes[0].off_rank_reads(), 0);
    }
}
