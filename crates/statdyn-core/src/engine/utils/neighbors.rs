use crate::core::models::simulation_box::SimulationBox;
use crate::core::utils::geometry::Dimensionality;
use itertools::Itertools;
use kiddo::SquaredEuclidean;
use kiddo::float::kdtree::KdTree;
use nalgebra::Vector3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Leaf capacity of the tree; lattice-like frames put many particles on one plane.
const BUCKET_SIZE: usize = 256;

type PeriodicTree<const K: usize> = KdTree<f64, u64, K, BUCKET_SIZE, u32>;

/// Sorted indices of the particles within `cutoff` of each particle under periodic
/// boundaries, matching a minimum-image distance test.
///
/// The tree holds every wrapped position plus its periodic images lying within `cutoff`
/// of a cell face, so one radius query per particle sees all of its neighbours.
pub fn neighbor_lists(
    positions: &[Vector3<f64>],
    cell: &SimulationBox,
    cutoff: f64,
    dimensions: Dimensionality,
) -> Vec<Vec<usize>> {
    match dimensions {
        Dimensionality::Two => periodic_lists::<2>(positions, cell, cutoff, dimensions),
        Dimensionality::Three => periodic_lists::<3>(positions, cell, cutoff, dimensions),
    }
}

fn as_point<const K: usize>(v: &Vector3<f64>) -> [f64; K] {
    std::array::from_fn(|axis| v[axis])
}

fn periodic_lists<const K: usize>(
    positions: &[Vector3<f64>],
    cell: &SimulationBox,
    cutoff: f64,
    dimensions: Dimensionality,
) -> Vec<Vec<usize>> {
    let matrix = cell.matrix();
    let padding: Vec<f64> = (0..K)
        .map(|axis| cutoff / cell.plane_spacing(axis, dimensions))
        .collect();

    // Cartesian position folded into the primary cell, with its fractional coordinates.
    let wrapped: Vec<(Vector3<f64>, Vector3<f64>)> = positions
        .iter()
        .map(|r| {
            let r = dimensions.project(*r);
            let mut fractional = cell.to_fractional(&r);
            let mut shift = Vector3::zeros();
            for axis in 0..K {
                shift[axis] = fractional[axis].floor();
                fractional[axis] -= shift[axis];
            }
            (dimensions.project(r - matrix * shift), fractional)
        })
        .collect();

    let images: Vec<Vec<i32>> = padding
        .iter()
        .map(|p| {
            let reach = p.ceil() as i32;
            -reach..=reach
        })
        .multi_cartesian_product()
        .collect();

    let mut tree: PeriodicTree<K> = KdTree::with_capacity(positions.len());
    for (index, (position, fractional)) in wrapped.iter().enumerate() {
        for image in &images {
            let near_cell = (0..K).all(|axis| {
                let shifted = fractional[axis] + f64::from(image[axis]);
                shifted >= -padding[axis] && shifted <= 1.0 + padding[axis]
            });
            if !near_cell {
                continue;
            }
            let mut shift = Vector3::zeros();
            for axis in 0..K {
                shift[axis] = f64::from(image[axis]);
            }
            let point = dimensions.project(position + matrix * shift);
            tree.add(&as_point::<K>(&point), index as u64);
        }
    }

    let cutoff_sq = cutoff * cutoff;
    let query = |(index, (position, _)): (usize, &(Vector3<f64>, Vector3<f64>))| {
        let mut neighbors: Vec<usize> = tree
            .within_unsorted::<SquaredEuclidean>(&as_point::<K>(position), cutoff_sq)
            .into_iter()
            .filter(|found| found.distance < cutoff_sq)
            .map(|found| found.item as usize)
            .filter(|&other| other != index)
            .collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    };

    #[cfg(not(feature = "parallel"))]
    let iterator = wrapped.iter().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = wrapped.par_iter().enumerate();

    iterator.map(query).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force(
        positions: &[Vector3<f64>],
        cell: &SimulationBox,
        cutoff: f64,
        dimensions: Dimensionality,
    ) -> Vec<Vec<usize>> {
        let mut lists = vec![Vec::new(); positions.len()];
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                let delta = cell.minimum_image(&(positions[j] - positions[i]), dimensions);
                if delta.norm_squared() < cutoff * cutoff {
                    lists[i].push(j);
                    lists[j].push(i);
                }
            }
        }
        lists
    }

    /// Random positions spread over three cells along each axis to exercise wrapping.
    fn scattered(cell: &SimulationBox, count: usize, seed: u64) -> Vec<Vector3<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let fractional = Vector3::new(
                    rng.gen_range(-1.0..2.0),
                    rng.gen_range(-1.0..2.0),
                    rng.gen_range(-1.0..2.0),
                );
                cell.to_cartesian(&fractional)
            })
            .collect()
    }

    #[test]
    fn matches_brute_force_in_triclinic_box() {
        let cell = SimulationBox::from_tilt(6.0, 5.5, 7.0, 0.3, -0.2, 0.15).unwrap();
        let positions = scattered(&cell, 80, 11);
        for cutoff in [1.2, 2.5, 3.4] {
            assert_eq!(
                neighbor_lists(&positions, &cell, cutoff, Dimensionality::Three),
                brute_force(&positions, &cell, cutoff, Dimensionality::Three),
                "cutoff {cutoff}"
            );
        }
    }

    #[test]
    fn matches_brute_force_in_tilted_plane() {
        let cell = SimulationBox::from_tilt(7.0, 6.0, 1.0, 0.4, 0.0, 0.0).unwrap();
        let positions = scattered(&cell, 60, 5);
        for cutoff in [1.0, 2.8] {
            assert_eq!(
                neighbor_lists(&positions, &cell, cutoff, Dimensionality::Two),
                brute_force(&positions, &cell, cutoff, Dimensionality::Two),
                "cutoff {cutoff}"
            );
        }
    }

    #[test]
    fn neighbours_across_the_boundary_are_found() {
        let cell = SimulationBox::orthorhombic(10.0, 10.0, 10.0).unwrap();
        let positions = vec![
            Vector3::new(4.8, 0.0, 0.0),
            Vector3::new(-4.8, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
        ];
        let lists = neighbor_lists(&positions, &cell, 1.0, Dimensionality::Three);
        assert_eq!(lists, vec![vec![1], vec![0], vec![]]);
    }

    #[test]
    fn simple_cubic_lattice_has_six_neighbours() {
        let cell = SimulationBox::orthorhombic(8.0, 8.0, 8.0).unwrap();
        let positions: Vec<Vector3<f64>> = (0..8)
            .flat_map(|i| {
                (0..8).flat_map(move |j| {
                    (0..8).map(move |k| Vector3::new(f64::from(i), f64::from(j), f64::from(k)))
                })
            })
            .collect();
        let lists = neighbor_lists(&positions, &cell, 1.1, Dimensionality::Three);
        assert_eq!(lists.len(), 512);
        assert!(lists.iter().all(|n| n.len() == 6));
    }
}
