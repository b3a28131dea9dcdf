//! Flat public ids and the generation-tagged handles used internally.

/// Sentinel returned for failed allocations and stored in miss records
pub const INVALID_ID: u32 = 0xFFFF_FFFF;

/// Geometry reference as held by the instance table. `generation` is bumped
/// by every `ClearGeom`, so handles from an earlier generation are stale even
/// when their index has been reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GeomHandle {
    pub generation: u32,
    pub index: u32,
}

impl GeomHandle {
    pub fn new(generation: u32, index: u32) -> Self {
        GeomHandle { generation, index }
    }
}

pub fn is_valid(id: u32) -> bool {
    id != INVALID_ID
}
