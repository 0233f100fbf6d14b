/*
 * Copyright (C) 2018 Nils Asmussen <nils@os.inf.tu-dresden.de>
 * Economic rights: Technische Universitaet Dresden (Germany)
 *
 * Copyright (C) 2019-2022 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of M3 (Microkernel-based SysteM for Heterogeneous Manycores).
 *
 * M3 is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * M3 is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

use base::col::Vec;
use base::io::LogFlags;
use base::kif::{TileDesc, TileISA, TileType};
use base::log;
use base::quota;
use base::rc::Rc;
use base::tcu::{ActId, EpId, TileId, TOTAL_EPS};

use crate::cap::{EPQuota, TileObject};

struct TileState {
    id: TileId,
    desc: TileDesc,
    // the root tile object, if activities can run on this tile
    obj: Option<Rc<TileObject>>,
    // bitmap of the allocated endpoints
    eps: u128,
    // handed out by the resource manager
    allocated: bool,
    // the activity that currently occupies the tile
    user: Option<ActId>,
}

/// Keeps track of the tiles, their endpoints, and who is using them
pub struct TileMng {
    tiles: Vec<TileState>,
}

impl TileMng {
    /// Creates the manager for the given tiles; `kernel` is the tile the kernel runs on
    pub fn new(descs: &[TileDesc], kernel: TileId) -> Self {
        let tiles = descs
            .iter()
            .enumerate()
            .map(|(i, desc)| {
                let id = TileId::new(kernel.chip(), i as u8);
                let obj = if id != kernel && desc.supports_activities() {
                    let quota = EPQuota::new(quota::Id::from(id.raw()), TOTAL_EPS as u32);
                    Some(TileObject::new(id, *desc, quota))
                }
                else {
                    None
                };
                TileState {
                    id,
                    desc: *desc,
                    obj,
                    eps: 0,
                    allocated: id == kernel,
                    user: None,
                }
            })
            .collect();
        Self { tiles }
    }

    fn get(&self, tile: TileId) -> Option<&TileState> {
        self.tiles.get(tile.tile() as usize)
    }

    fn get_mut(&mut self, tile: TileId) -> Option<&mut TileState> {
        self.tiles.get_mut(tile.tile() as usize)
    }

    pub fn count(&self) -> usize {
        self.tiles.len()
    }

    pub fn desc(&self, tile: TileId) -> Option<TileDesc> {
        self.get(tile).map(|t| t.desc)
    }

    /// Returns the root tile object for the given tile
    pub fn tile_obj(&self, tile: TileId) -> Option<&Rc<TileObject>> {
        self.get(tile).and_then(|t| t.obj.as_ref())
    }

    /// Returns the first memory tile
    pub fn mem_tile(&self) -> Option<TileId> {
        self.tiles
            .iter()
            .find(|t| t.desc.tile_type() == TileType::Mem)
            .map(|t| t.id)
    }

    /// Finds a tile that is not allocated yet and matches `desc`
    ///
    /// The tile type has to match. The ISA and attributes only need to match if `desc` specifies
    /// them.
    pub fn find_free(&self, desc: TileDesc) -> Option<TileId> {
        self.tiles
            .iter()
            .find(|t| {
                t.obj.is_some()
                    && !t.allocated
                    && t.desc.tile_type() == desc.tile_type()
                    && (desc.isa() == TileISA::None || t.desc.isa() == desc.isa())
                    && t.desc.attr().contains(desc.attr())
            })
            .map(|t| t.id)
    }

    pub fn set_allocated(&mut self, tile: TileId, allocated: bool) {
        if let Some(t) = self.get_mut(tile) {
            log!(LogFlags::KernActs, "Tile {}: allocated={}", tile, allocated);
            t.allocated = allocated;
        }
    }

    /// Returns the activity that currently occupies the tile
    pub fn user(&self, tile: TileId) -> Option<ActId> {
        self.get(tile).and_then(|t| t.user)
    }

    pub fn set_user(&mut self, tile: TileId, act: Option<ActId>) {
        if let Some(t) = self.get_mut(tile) {
            t.user = act;
        }
    }

    /// Allocates `count` contiguous endpoints on the given tile and returns the first one
    pub fn alloc_eps(&mut self, tile: TileId, count: u32) -> Option<EpId> {
        let t = self.get_mut(tile)?;
        let count = count as usize;
        let mut start = 0;
        while start + count <= TOTAL_EPS as usize {
            match (start..start + count).find(|ep| t.eps & (1 << ep) != 0) {
                // continue behind the occupied endpoint
                Some(used) => start = used + 1,
                None => {
                    t.eps |= Self::mask(start as EpId, count as u32);
                    log!(
                        LogFlags::KernEPs,
                        "Tile {}: allocated EPs {}..{}",
                        tile,
                        start,
                        start + count
                    );
                    return Some(start as EpId);
                },
            }
        }
        None
    }

    /// Allocates the endpoints `ep`..`ep`+`count` on the given tile
    pub fn alloc_eps_at(&mut self, tile: TileId, ep: EpId, count: u32) -> bool {
        if ep as u32 + count > TOTAL_EPS as u32 {
            return false;
        }
        match self.get_mut(tile) {
            Some(t) if t.eps & Self::mask(ep, count) == 0 => {
                t.eps |= Self::mask(ep, count);
                true
            },
            _ => false,
        }
    }

    pub fn free_eps(&mut self, tile: TileId, ep: EpId, count: u32) {
        if let Some(t) = self.get_mut(tile) {
            log!(
                LogFlags::KernEPs,
                "Tile {}: freed EPs {}..{}",
                tile,
                ep,
                ep as u32 + count
            );
            t.eps &= !Self::mask(ep, count);
        }
    }

    fn mask(ep: EpId, count: u32) -> u128 {
        let bits = if count >= 128 {
            !0u128
        }
        else {
            (1u128 << count) - 1
        };
        bits << ep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use base::kif::TileAttr;

    const KERNEL: TileId = TileId::new(0, 0);

    fn mng() -> TileMng {
        let comp = TileDesc::new_with_attr(TileType::Comp, TileISA::X86, 0, TileAttr::IMEM);
        TileMng::new(
            &[
                comp,
                comp,
                comp,
                TileDesc::new(TileType::Mem, TileISA::None, 0x100000),
            ],
            KERNEL,
        )
    }

    #[test]
    fn contiguous_eps() {
        let mut tiles = mng();
        let t1 = TileId::new(0, 1);
        assert_eq!(tiles.alloc_eps(t1, 7), Some(0));
        assert_eq!(tiles.alloc_eps(t1, 1), Some(7));
        assert!(tiles.alloc_eps_at(t1, 10, 2));
        assert!(!tiles.alloc_eps_at(t1, 11, 1));
        // the gap 8..10 is too small
        assert_eq!(tiles.alloc_eps(t1, 3), Some(12));
        assert_eq!(tiles.alloc_eps(t1, 2), Some(8));

        tiles.free_eps(t1, 0, 7);
        assert_eq!(tiles.alloc_eps(t1, 7), Some(0));
        assert_eq!(tiles.alloc_eps(t1, 200), None);
        assert!(!tiles.alloc_eps_at(t1, 127, 2));
    }

    #[test]
    fn free_tiles() {
        let mut tiles = mng();
        assert!(tiles.tile_obj(KERNEL).is_none());
        assert_eq!(tiles.mem_tile(), Some(TileId::new(0, 3)));

        let req = TileDesc::new(TileType::Comp, TileISA::None, 0);
        assert_eq!(tiles.find_free(req), Some(TileId::new(0, 1)));
        tiles.set_allocated(TileId::new(0, 1), true);
        assert_eq!(tiles.find_free(req), Some(TileId::new(0, 2)));
        tiles.set_allocated(TileId::new(0, 2), true);
        assert_eq!(tiles.find_free(req), None);

        tiles.set_allocated(TileId::new(0, 1), false);
        let arm = TileDesc::new(TileType::Comp, TileISA::ARM, 0);
        assert_eq!(tiles.find_free(arm), None);
        assert_eq!(tiles.find_free(req.with_properties("imem")), Some(TileId::new(0, 1)));
    }
}
