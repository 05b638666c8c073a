//! Process-grid topology and the per-rank neighbor table.
//!
//! Ranks are arranged in a 2-D Cartesian grid over the two lateral axes
//! (y, z); the vertical x axis is never partitioned. Each rank sees at most
//! four in-plane neighbors. A side with no neighbor is a physical boundary
//! and the exchange engines must leave its ghost cells untouched.

use crate::error::{Result, TemblorError};

pub type RankId = usize;

/// One of the four in-plane exchange directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    YMinus,
    YPlus,
    ZMinus,
    ZPlus,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::YMinus,
        Direction::YPlus,
        Direction::ZMinus,
        Direction::ZPlus,
    ];

    /// Dense index in 0..4, used for buffer-slot addressing and message tags.
    pub fn index(self) -> usize {
        match self {
            Direction::YMinus => 0,
            Direction::YPlus => 1,
            Direction::ZMinus => 2,
            Direction::ZPlus => 3,
        }
    }

    /// The direction a matching message travels back from.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::YMinus => Direction::YPlus,
            Direction::YPlus => Direction::YMinus,
            Direction::ZMinus => Direction::ZPlus,
            Direction::ZPlus => Direction::ZMinus,
        }
    }

    pub fn is_y(self) -> bool {
        matches!(self, Direction::YMinus | Direction::YPlus)
    }
}

/// What lies on one side of the local sub-domain.
///
/// Replaces the `-1` rank sentinel of integer-id schemes: a physical boundary
/// is a distinct variant, not a magic value call sites must remember to test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbor {
    /// Physical/external boundary. Ghost cells hold boundary-condition values
    /// owned by the boundary module, never exchange output.
    Boundary,
    /// A real rank. May equal the local rank on a periodic axis of size 1.
    Rank(RankId),
}

impl Neighbor {
    pub fn rank(self) -> Option<RankId> {
        match self {
            Neighbor::Boundary => None,
            Neighbor::Rank(id) => Some(id),
        }
    }
}

/// Fixed four-entry table of a rank's in-plane neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborTable {
    sides: [Neighbor; 4],
}

impl NeighborTable {
    /// A table with physical boundaries on all four sides (single rank,
    /// non-periodic domain).
    pub fn isolated() -> Self {
        Self {
            sides: [Neighbor::Boundary; 4],
        }
    }

    pub fn get(&self, dir: Direction) -> Neighbor {
        self.sides[dir.index()]
    }

    pub fn set(&mut self, dir: Direction, neighbor: Neighbor) {
        self.sides[dir.index()] = neighbor;
    }

    /// Directions that have a real neighbor, in canonical order.
    pub fn exchange_directions(&self) -> impl Iterator<Item = (Direction, RankId)> + '_ {
        Direction::ALL
            .iter()
            .filter_map(|&d| self.get(d).rank().map(|r| (d, r)))
    }
}

/// Logical layout of ranks over the (y, z) lateral axes.
///
/// Rank ids are row-major: `rank = iy + iz * ranks_y`.
#[derive(Debug, Clone, Copy)]
pub struct ProcessGrid {
    pub ranks_y: usize,
    pub ranks_z: usize,
    pub periodic_y: bool,
    pub periodic_z: bool,
}

impl ProcessGrid {
    pub fn new(ranks_y: usize, ranks_z: usize) -> Result<Self> {
        if ranks_y == 0 || ranks_z == 0 {
            return Err(TemblorError::Config(format!(
                "process grid must be non-empty, got {ranks_y} x {ranks_z}"
            )));
        }
        Ok(Self {
            ranks_y,
            ranks_z,
            periodic_y: false,
            periodic_z: false,
        })
    }

    pub fn with_periodic(mut self, periodic_y: bool, periodic_z: bool) -> Self {
        self.periodic_y = periodic_y;
        self.periodic_z = periodic_z;
        self
    }

    pub fn num_ranks(&self) -> usize {
        self.ranks_y * self.ranks_z
    }

    /// (iy, iz) grid coordinates of a rank.
    pub fn coords(&self, rank: RankId) -> Result<(usize, usize)> {
        if rank >= self.num_ranks() {
            return Err(TemblorError::Config(format!(
                "rank {rank} outside {}x{} process grid",
                self.ranks_y, self.ranks_z
            )));
        }
        Ok((rank % self.ranks_y, rank / self.ranks_y))
    }

    pub fn rank_at(&self, iy: usize, iz: usize) -> RankId {
        iy + iz * self.ranks_y
    }

    /// Build the four-entry neighbor table for `rank`.
    ///
    /// On a periodic axis the table wraps; with a single rank along that axis
    /// the rank becomes its own neighbor on both sides, which the exchange
    /// engines resolve as a local copy.
    pub fn neighbor_table(&self, rank: RankId) -> Result<NeighborTable> {
        let (iy, iz) = self.coords(rank)?;
        let mut table = NeighborTable::isolated();

        let side = |coord: usize, extent: usize, periodic: bool, step: isize| -> Option<usize> {
            let next = coord as isize + step;
            if next < 0 {
                periodic.then_some(extent - 1)
            } else if next as usize >= extent {
                periodic.then_some(0)
            } else {
                Some(next as usize)
            }
        };

        if let Some(jy) = side(iy, self.ranks_y, self.periodic_y, -1) {
            table.set(Direction::YMinus, Neighbor::Rank(self.rank_at(jy, iz)));
        }
        if let Some(jy) = side(iy, self.ranks_y, self.periodic_y, 1) {
            table.set(Direction::YPlus, Neighbor::Rank(self.rank_at(jy, iz)));
        }
        if let Some(jz) = side(iz, self.ranks_z, self.periodic_z, -1) {
            table.set(Direction::ZMinus, Neighbor::Rank(self.rank_at(iy, jz)));
        }
        if let Some(jz) = side(iz, self.ranks_z, self.periodic_z, 1) {
            table.set(Direction::ZPlus, Neighbor::Rank(self.rank_at(iy, jz)));
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_rank_has_no_neighbors() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let table = grid.neighbor_table(0).unwrap();
        for d in Direction::ALL {
            assert_eq!(table.get(d), Neighbor::Boundary);
        }
        assert_eq!(table.exchange_directions().count(), 0);
    }

    #[test]
    fn two_by_one_grid_neighbors() {
        let grid = ProcessGrid::new(2, 1).unwrap();
        let t0 = grid.neighbor_table(0).unwrap();
        let t1 = grid.neighbor_table(1).unwrap();

        assert_eq!(t0.get(Direction::YMinus), Neighbor::Boundary);
        assert_eq!(t0.get(Direction::YPlus), Neighbor::Rank(1));
        assert_eq!(t1.get(Direction::YMinus), Neighbor::Rank(0));
        assert_eq!(t1.get(Direction::YPlus), Neighbor::Boundary);
        assert_eq!(t0.get(Direction::ZMinus), Neighbor::Boundary);
        assert_eq!(t1.get(Direction::ZPlus), Neighbor::Boundary);
    }

    #[test]
    fn periodic_single_rank_is_own_neighbor() {
        let grid = ProcessGrid::new(1, 1).unwrap().with_periodic(true, false);
        let table = grid.neighbor_table(0).unwrap();
        assert_eq!(table.get(Direction::YMinus), Neighbor::Rank(0));
        assert_eq!(table.get(Direction::YPlus), Neighbor::Rank(0));
        assert_eq!(table.get(Direction::ZMinus), Neighbor::Boundary);
    }

    #[test]
    fn two_by_two_grid_coords_round_trip() {
        let grid = ProcessGrid::new(2, 2).unwrap();
        for rank in 0..grid.num_ranks() {
            let (iy, iz) = grid.coords(rank).unwrap();
            assert_eq!(grid.rank_at(iy, iz), rank);
        }
        let t3 = grid.neighbor_table(3).unwrap();
        assert_eq!(t3.get(Direction::YMinus), Neighbor::Rank(2));
        assert_eq!(t3.get(Direction::ZMinus), Neighbor::Rank(1));
        assert_eq!(t3.get(Direction::YPlus), Neighbor::Boundary);
    }

    #[test]
    fn rank_out_of_range_is_config_error() {
        let grid = ProcessGrid::new(2, 2).unwrap();
        assert!(grid.neighbor_table(4).is_err());
    }

    #[test]
    fn opposite_directions_pair_up() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert_ne!(d.opposite(), d);
        }
    }
}
