//! The mesh element value type and its fixed wire representation.
//!
//! Elements are plain copyable values: the transport kernel reads them by
//! value, the request engine ships them between ranks, and only the
//! neighbor remap and the per-step energy update ever mutate one. The
//! wire image is three little-endian blocks: eight `u32` words (global
//! id, six face neighbors, one padding slot), then six `i32` boundary
//! tags, then fourteen `f64` fields. An element occupies exactly
//! [`WIRE_SIZE`] bytes on every rank.

use crate::message::util;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One face of an axis-aligned hexahedral element. The order {X+, X−,
/// Y+, Y−, Z+, Z−} is fixed and shared by the neighbor array, the
/// boundary array, and the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    XPos,
    XNeg,
    YPos,
    YNeg,
    ZPos,
    ZNeg,
}

impl Direction {
    /// All six directions in face order.
    pub const ALL: [Direction; 6] = [
        Direction::XPos,
        Direction::XNeg,
        Direction::YPos,
        Direction::YNeg,
        Direction::ZPos,
        Direction::ZNeg,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Boundary condition tag on one face. A closed set of four: transport
/// dispatches on the tag with a `match`, never through indirection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BcType {
    /// Face on the problem boundary; photons crossing it escape.
    Vacuum,
    /// Face on the problem boundary; photons crossing it reflect.
    Reflect,
    /// Face shared with another element owned by this rank.
    Element,
    /// Face shared with an element owned by another rank.
    Processor,
}

impl BcType {
    fn to_wire(self) -> i32 {
        match self {
            BcType::Vacuum => 0,
            BcType::Reflect => 1,
            BcType::Element => 2,
            BcType::Processor => 3,
        }
    }

    fn from_wire(tag: i32) -> Result<BcType, WireError> {
        match tag {
            0 => Ok(BcType::Vacuum),
            1 => Ok(BcType::Reflect),
            2 => Ok(BcType::Element),
            3 => Ok(BcType::Processor),
            _ => Err(WireError::UnknownBc(tag)),
        }
    }
}

/// Raised when a wire payload cannot be decoded back into elements.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("payload length {0} is not a whole number of records")]
    Truncated(usize),
    #[error("unknown boundary tag {0}")]
    UnknownBc(i32),
}

/// Bytes in the wire image of one element: eight `u32`, six `i32`,
/// fourteen `f64`.
pub const WIRE_SIZE: usize = 8 * 4 + 6 * 4 + 14 * 8;

/// One cell of the structured grid: geometry, face topology, material
/// and thermal state, and the per-step optical coefficients.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Element {
    id: u32,
    neighbors: [u32; 6],
    bc: [BcType; 6],
    x_lo: f64,
    x_hi: f64,
    y_lo: f64,
    y_hi: f64,
    z_lo: f64,
    z_hi: f64,
    cv: f64,
    rho: f64,
    t_e: f64,
    t_r: f64,
    t_s: f64,
    op_a: f64,
    op_s: f64,
    f: f64,
}

impl Element {
    /// Creates an element with the given geometry and material state.
    /// Every face starts as a vacuum self-loop; the grid generator and
    /// the decomposition remap assign the real topology.
    pub fn new(
        id: u32,
        x: (f64, f64),
        y: (f64, f64),
        z: (f64, f64),
        cv: f64,
        rho: f64,
        t_e: f64,
        t_r: f64,
    ) -> Self {
        Self {
            id,
            neighbors: [id; 6],
            bc: [BcType::Vacuum; 6],
            x_lo: x.0,
            x_hi: x.1,
            y_lo: y.0,
            y_hi: y.1,
            z_lo: z.0,
            z_hi: z.1,
            cv,
            rho,
            t_e,
            t_r,
            t_s: 0.0,
            op_a: 0.0,
            op_s: 0.0,
            f: 0.0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    /// Global id of the element across the given face. Faces tagged
    /// vacuum or reflect loop back to this element's own id.
    pub fn neighbor(&self, d: Direction) -> u32 {
        self.neighbors[d.index()]
    }

    pub fn set_neighbor(&mut self, d: Direction, id: u32) {
        self.neighbors[d.index()] = id;
    }

    pub fn bc(&self, d: Direction) -> BcType {
        self.bc[d.index()]
    }

    pub fn set_bc(&mut self, d: Direction, bc: BcType) {
        self.bc[d.index()] = bc;
    }

    pub fn volume(&self) -> f64 {
        (self.x_hi - self.x_lo) * (self.y_hi - self.y_lo) * (self.z_hi - self.z_lo)
    }

    pub fn lower(&self) -> (f64, f64, f64) {
        (self.x_lo, self.y_lo, self.z_lo)
    }

    pub fn upper(&self) -> (f64, f64, f64) {
        (self.x_hi, self.y_hi, self.z_hi)
    }

    pub fn cv(&self) -> f64 {
        self.cv
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn t_e(&self) -> f64 {
        self.t_e
    }

    pub fn set_t_e(&mut self, t: f64) {
        self.t_e = t;
    }

    pub fn t_r(&self) -> f64 {
        self.t_r
    }

    pub fn t_s(&self) -> f64 {
        self.t_s
    }

    pub fn set_t_s(&mut self, t: f64) {
        self.t_s = t;
    }

    pub fn op_a(&self) -> f64 {
        self.op_a
    }

    pub fn set_op_a(&mut self, op: f64) {
        self.op_a = op;
    }

    pub fn op_s(&self) -> f64 {
        self.op_s
    }

    pub fn set_op_s(&mut self, op: f64) {
        self.op_s = op;
    }

    /// The Fleck factor, derived at the start of each step.
    pub fn f(&self) -> f64 {
        self.f
    }

    pub fn set_f(&mut self, f: f64) {
        self.f = f;
    }

    /// Appends the fixed-layout wire image of this element to `buf`.
    pub fn write_wire(&self, buf: &mut Vec<u8>) {
        util::put_u32(buf, self.id);
        for d in 0..6 {
            util::put_u32(buf, self.neighbors[d]);
        }
        util::put_u32(buf, 0);
        for d in 0..6 {
            util::put_i32(buf, self.bc[d].to_wire());
        }
        let scalars = [
            self.x_lo, self.x_hi, self.y_lo, self.y_hi, self.z_lo, self.z_hi, self.cv, self.rho,
            self.t_e, self.t_r, self.t_s, self.op_a, self.op_s, self.f,
        ];
        for &x in scalars.iter() {
            util::put_f64(buf, x);
        }
    }

    /// Decodes one element from exactly [`WIRE_SIZE`] bytes.
    pub fn read_wire(bytes: &[u8]) -> Result<Element, WireError> {
        if bytes.len() != WIRE_SIZE {
            return Err(WireError::Truncated(bytes.len()));
        }
        let id = util::get_u32(bytes, 0);
        let mut neighbors = [0u32; 6];
        for d in 0..6 {
            neighbors[d] = util::get_u32(bytes, 4 + 4 * d);
        }
        let mut bc = [BcType::Vacuum; 6];
        for d in 0..6 {
            bc[d] = BcType::from_wire(util::get_i32(bytes, 32 + 4 * d))?;
        }
        let mut scalars = [0.0; 14];
        for (k, x) in scalars.iter_mut().enumerate() {
            *x = util::get_f64(bytes, 56 + 8 * k);
        }
        Ok(Element {
            id,
            neighbors,
            bc,
            x_lo: scalars[0],
            x_hi: scalars[1],
            y_lo: scalars[2],
            y_hi: scalars[3],
            z_lo: scalars[4],
            z_hi: scalars[5],
            cv: scalars[6],
            rho: scalars[7],
            t_e: scalars[8],
            t_r: scalars[9],
            t_s: scalars[10],
            op_a: scalars[11],
            op_s: scalars[12],
            f: scalars[13],
        })
    }
}

/// Encodes a list of elements into one CELL payload.
pub fn encode_elements(elems: &[Element]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(elems.len() * WIRE_SIZE);
    for e in elems {
        e.write_wire(&mut buf);
    }
    buf
}

/// Decodes a CELL payload back into elements.
pub fn decode_elements(bytes: &[u8]) -> Result<Vec<Element>, WireError> {
    if bytes.len() % WIRE_SIZE != 0 {
        return Err(WireError::Truncated(bytes.len()));
    }
    bytes.chunks(WIRE_SIZE).map(Element::read_wire).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Element {
        let mut e = Element::new(
            42,
            (0.0, 0.25),
            (1.0, 1.5),
            (-2.0, 0.0),
            0.1,
            9.8,
            1.25,
            0.75,
        );
        e.set_neighbor(Direction::XPos, 43);
        e.set_bc(Direction::XPos, BcType::Element);
        e.set_neighbor(Direction::YNeg, 17);
        e.set_bc(Direction::YNeg, BcType::Processor);
        e.set_bc(Direction::ZPos, BcType::Reflect);
        e.set_t_s(0.5);
        e.set_op_a(3.0);
        e.set_op_s(0.25);
        e.set_f(0.875);
        e
    }

    #[test]
    fn wire_round_trip_is_bitwise() {
        let e = sample();
        let mut buf = Vec::new();
        e.write_wire(&mut buf);
        assert_eq!(buf.len(), WIRE_SIZE);
        assert_eq!(Element::read_wire(&buf).unwrap(), e);
    }

    #[test]
    fn list_round_trip() {
        let elems = vec![sample(), Element::new(7, (0.0, 1.0), (0.0, 1.0), (0.0, 1.0), 1.0, 1.0, 1.0, 1.0)];
        let buf = encode_elements(&elems);
        assert_eq!(decode_elements(&buf).unwrap(), elems);
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let mut buf = encode_elements(&[sample()]);
        buf.pop();
        assert!(matches!(
            decode_elements(&buf),
            Err(WireError::Truncated(_))
        ));
    }

    #[test]
    fn decode_rejects_unknown_boundary_tag() {
        let mut buf = encode_elements(&[sample()]);
        buf[32] = 200;
        assert!(matches!(
            decode_elements(&buf),
            Err(WireError::UnknownBc(200))
        ));
    }

    #[test]
    fn volume_of_a_box() {
        let e = Element::new(0, (0.0, 2.0), (0.0, 3.0), (0.0, 0.5), 1.0, 1.0, 1.0, 1.0);
        assert_eq!(e.volume(), 3.0);
    }

    #[test]
    fn new_faces_are_self_loops() {
        let e = Element::new(9, (0.0, 1.0), (0.0, 1.0), (0.0, 1.0), 1.0, 1.0, 1.0, 1.0);
        for d in Direction::ALL {
            assert_eq!(e.neighbor(d), 9);
            assert_eq!(e.bc(d), BcType::Vacuum);
        }
    }
}
