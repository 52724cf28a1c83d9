//! The ring-neighbourhood network of a pixelation.
//!
//! Every pixel is connected to itself, to its two neighbours on the same
//! ring, and to the pixels closest in longitude on each adjacent ring.
//! At the poles and on very short rings some of these coincide, so the
//! neighbourhood is 9 pixels at most and fewer where not defined. The
//! relation is symmetrised, as the walk operators assume that `a` is
//! reachable from `b` whenever `b` is reachable from `a`.
//!
//! The network is a pure function of the pixelation and is built once per
//! run.

use crate::pixel::Pixelation;

/// Adjacency lists, indexed by pixel id. Each list is sorted, starts as a
/// superset of `{id}`, and is symmetric.
#[derive(Clone, Debug)]
pub struct Network {
    adj: Vec<Vec<usize>>,
}

impl Network {
    pub fn new(pix: &Pixelation) -> Network {
        let mut adj: Vec<Vec<usize>> = Vec::with_capacity(pix.len());

        for id in 0..pix.len() {
            let mut n = Vec::with_capacity(9);
            n.push(id);

            let r = pix.ring_of(id);
            let ring = &pix.rings()[r];
            let col = id - ring.first;

            // Same ring.
            if ring.len > 1 {
                n.push(ring.first + (col + 1) % ring.len);
                n.push(ring.first + (col + ring.len - 1) % ring.len);
            }

            // Adjacent rings.
            let lon = pix.locus(id).lon;
            if r > 0 {
                ring_closest(pix, r - 1, lon, &mut n);
            }
            if r + 1 < pix.num_rings() {
                ring_closest(pix, r + 1, lon, &mut n);
            }

            n.sort_unstable();
            n.dedup();
            adj.push(n);
        }

        // Symmetrise: a short ring may pick a neighbour on a long ring
        // that does not pick it back.
        for id in 0..adj.len() {
            for i in 0..adj[id].len() {
                let nb = adj[id][i];
                if let Err(at) = adj[nb].binary_search(&id) {
                    adj[nb].insert(at, id);
                }
            }
        }

        Network { adj }
    }

    /// The neighbourhood of `id`, including `id` itself.
    #[inline]
    pub fn neighbors(&self, id: usize) -> &[usize] {
        &self.adj[id]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.adj.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }
}

/// Pushes the up-to-3 pixels of ring `r` closest in longitude to `lon`.
fn ring_closest(pix: &Pixelation, r: usize, lon: f64, out: &mut Vec<usize>) {
    let ring = &pix.rings()[r];
    if ring.len <= 3 {
        out.extend(ring.first..ring.first + ring.len);
        return;
    }
    let c = ((lon + 180.0) / 360.0 * ring.len as f64).floor() as usize % ring.len;
    out.push(ring.first + (c + ring.len - 1) % ring.len);
    out.push(ring.first + c);
    out.push(ring.first + (c + 1) % ring.len);
}
