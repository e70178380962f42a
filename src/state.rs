//! Per-step bookkeeping for the IMC solve: time-step controls and the
//! energy-conservation tallies the mesh reports into.

use crate::input::Input;
use log::info;

pub struct ImcState {
    step: u32,
    time: f64,
    dt: f64,
    dt_mult: f64,
    t_stop: f64,
    pre_census_e: f64,
    pre_mat_e: f64,
    post_mat_e: f64,
    emission_e: f64,
    source_e: f64,
    absorbed_e: f64,
    off_rank_reads: u32,
}

impl ImcState {
    pub fn new(input: &Input) -> Self {
        Self {
            step: 1,
            time: 0.0,
            dt: input.dt,
            dt_mult: input.dt_mult,
            t_stop: input.t_stop,
            pre_census_e: 0.0,
            pre_mat_e: 0.0,
            post_mat_e: 0.0,
            emission_e: 0.0,
            source_e: 0.0,
            absorbed_e: 0.0,
            off_rank_reads: 0,
        }
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn finished(&self) -> bool {
        self.time >= self.t_stop
    }

    /// Advances the clock and grows the step length.
    pub fn next_time_step(&mut self) {
        self.time += self.dt;
        self.dt *= self.dt_mult;
        self.step += 1;
    }

    pub fn pre_census_e(&self) -> f64 {
        self.pre_census_e
    }

    pub fn set_pre_census_e(&mut self, e: f64) {
        self.pre_census_e = e;
    }

    pub fn pre_mat_e(&self) -> f64 {
        self.pre_mat_e
    }

    pub fn set_pre_mat_e(&mut self, e: f64) {
        self.pre_mat_e = e;
    }

    pub fn post_mat_e(&self) -> f64 {
        self.post_mat_e
    }

    pub fn set_post_mat_e(&mut self, e: f64) {
        self.post_mat_e = e;
    }

    pub fn emission_e(&self) -> f64 {
        self.emission_e
    }

    pub fn set_emission_e(&mut self, e: f64) {
        self.emission_e = e;
    }

    pub fn source_e(&self) -> f64 {
        self.source_e
    }

    pub fn set_source_e(&mut self, e: f64) {
        self.source_e = e;
    }

    pub fn absorbed_e(&self) -> f64 {
        self.absorbed_e
    }

    pub fn set_absorbed_e(&mut self, e: f64) {
        self.absorbed_e = e;
    }

    pub fn off_rank_reads(&self) -> u32 {
        self.off_rank_reads
    }

    pub fn set_off_rank_reads(&mut self, n: u32) {
        self.off_rank_reads = n;
    }

    /// Logs the end-of-step energy balance.
    pub fn report_step(&self) {
        info!(
            "step {}: t = {:.6e}, emitted {:.6e}, absorbed {:.6e}, material {:.6e} -> {:.6e}, off-rank reads {}",
            self.step,
            self.time,
            self.emission_e,
            self.absorbed_e,
            self.pre_mat_e,
            self.post_mat_e,
            self.off_rank_reads,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::BcType;
    use crate::input::{DdMode, DecompMethod};

    fn input() -> Input {
        Input {
            ngx: 1,
            ngy: 1,
            ngz: 1,
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
            dt: 0.5,
            dt_mult: 2.0,
            t_stop: 1.0,
            dd_mode: DdMode::CellPass,
            decomposition: DecompMethod::Cube,
            grip_size: 1,
            max_map_size: 10,
        }
    }

    #[test]
    fn steps_grow_and_finish() {
        let mut state = ImcState::new(&input());
        assert_eq!(state.step(), 1);
        assert!(!state.finished());
        state.next_time_step();
        assert_eq!(state.step(), 2);
        assert_eq!(state.dt(), 1.0);
        state.next_time_step();
        assert!(state.finished());
    }
}
