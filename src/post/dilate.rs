//! Fill unmapped texels from the nearest mapped one.
//!
//! A ring of active texels grows outward from the mapped region one step per
//! iteration. Each newly reached texel adopts the closest source already
//! known to its neighbours, so colors are copied, never blended.

use crate::texel::{BitImage, LightImage};
use crate::util::IVec2;

/// Neighbourhood searched for a better source when a texel is reached.
const SEARCH_RANGE: i32 = 3;

/// Neighbours, nearest four first.
const NEIGHBOURS: [(i32, i32); 8] = [(0, -1), (-1, 0), (1, 0), (0, 1), (-1, -1), (1, -1), (-1, 1), (1, 1)];

/// Default iteration count for lightmaps.
pub const MAX_DILATE_DISTANCE: u32 = 256;

/// Copy mapped colors out into unmapped texels up to `max_dist` steps away.
/// A texel is mapped where `mask` is non zero. Returns the texels filled.
#[tracing::instrument(skip_all, fields(width = image.width(), height = image.height(), max_dist))]
pub fn dilate_image<T: Copy + Default>(image: &mut LightImage<T>, mask: &LightImage<u32>, max_dist: u32) -> usize {
    if image.num_pixels() == 0 || !image.same_size(mask) {
        return 0;
    }
    let sources = find_sources(mask, max_dist);

    let mut filled = 0;
    for y in 0..image.height() {
        for x in 0..image.width() {
            if let Some(s) = sources[(x, y)] {
                image[(x, y)] = image[(s.x as u32, s.y as u32)];
                filled += 1;
            }
        }
    }
    tracing::debug!(filled, "dilated");
    filled
}

/// Source texel for every unmapped texel the dilation reaches.
pub fn find_sources(mask: &LightImage<u32>, max_dist: u32) -> LightImage<Option<IVec2>> {
    let (w, h) = (mask.width(), mask.height());
    let mut sources: LightImage<Option<IVec2>> = LightImage::new(w, h);
    let mut done = BitImage::new(w, h);
    let mapped = |x: i32, y: i32| mask.get(x, y).is_some_and(|&id| id != 0);

    // the first ring touches mapped texels directly
    let mut actives = Vec::new();
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            if mapped(x, y) {
                continue;
            }
            if let Some(&(dx, dy)) = NEIGHBOURS.iter().find(|&&(dx, dy)| mapped(x + dx, y + dy)) {
                sources[(x as u32, y as u32)] = Some(IVec2::new(x + dx, y + dy));
                done.set(x, y, true);
                actives.push(IVec2::new(x, y));
            }
        }
    }

    for _ in 0..max_dist {
        if actives.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for &loc in &actives {
            if let Some(best) = best_source(&sources, loc) {
                sources[(loc.x as u32, loc.y as u32)] = Some(best);
            }
            for (dx, dy) in NEIGHBOURS {
                let (nx, ny) = (loc.x + dx, loc.y + dy);
                if !sources.is_within(nx, ny) || mapped(nx, ny) || done.get(nx, ny) {
                    continue;
                }
                if sources[(nx as u32, ny as u32)].is_none() {
                    done.set(nx, ny, true);
                    next.push(IVec2::new(nx, ny));
                }
            }
        }
        actives = next;
    }
    sources
}

/// Closest source referenced within [`SEARCH_RANGE`] of `loc`.
fn best_source(sources: &LightImage<Option<IVec2>>, loc: IVec2) -> Option<IVec2> {
    let mut best = None;
    let mut best_sl = i32::MAX;
    for y in loc.y - SEARCH_RANGE..=loc.y + SEARCH_RANGE {
        for x in loc.x - SEARCH_RANGE..=loc.x + SEARCH_RANGE {
            let Some(&Some(s)) = sources.get(x, y) else {
                continue;
            };
            let sl = (s - loc).length_squared();
            if sl < best_sl {
                best_sl = sl;
                best = Some(s);
            }
        }
    }
    best
}
