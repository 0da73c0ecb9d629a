//! Nearest neighbor search implementations

use pierfit_core::{NearestNeighborSearch, Point3f};
use rstar::{primitives::GeomWithData, RTree};

type IndexedPoint = GeomWithData<[f32; 3], usize>;

fn to_array(point: &Point3f) -> [f32; 3] {
    [point.x, point.y, point.z]
}

/// R*-tree backed spatial index for nearest neighbor search
pub struct RTreeIndex {
    tree: RTree<IndexedPoint>,
}

impl RTreeIndex {
    /// Bulk-load an index over `points`; results refer to positions in this slice
    pub fn new(points: &[Point3f]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(idx, point)| GeomWithData::new(to_array(point), idx))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl NearestNeighborSearch for RTreeIndex {
    fn find_nearest(&self, query: &Point3f) -> Option<(usize, f32)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&to_array(query))
            .next()
            .map(|(entry, distance_2)| (entry.data, distance_2.sqrt()))
    }

    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&to_array(query))
            .take(k)
            .map(|(entry, distance_2)| (entry.data, distance_2.sqrt()))
            .collect()
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        let mut neighbors: Vec<(usize, f32)> = self
            .tree
            .locate_within_distance(to_array(query), radius * radius)
            .map(|entry| {
                let p = entry.geom();
                let dx = p[0] - query.x;
                let dy = p[1] - query.y;
                let dz = p[2] - query.z;
                (entry.data, (dx * dx + dy * dy + dz * dz).sqrt())
            })
            .collect();
        sort_by_distance(&mut neighbors);
        neighbors
    }
}

/// Simple brute force nearest neighbor search for small datasets
pub struct BruteForceSearch {
    points: Vec<Point3f>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3f]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    fn distances(&self, query: &Point3f) -> Vec<(usize, f32)> {
        self.points
            .iter()
            .enumerate()
            .map(|(idx, point)| (idx, (point - query).norm()))
            .collect()
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_nearest(&self, query: &Point3f) -> Option<(usize, f32)> {
        self.find_k_nearest(query, 1).into_iter().next()
    }

    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        let mut distances = self.distances(query);
        sort_by_distance(&mut distances);
        distances.truncate(k);
        distances
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        let mut neighbors: Vec<(usize, f32)> = self
            .distances(query)
            .into_iter()
            .filter(|&(_, distance)| distance <= radius)
            .collect();
        sort_by_distance(&mut neighbors);
        neighbors
    }
}

// Ties broken by index so results do not depend on traversal order
fn sort_by_distance(neighbors: &mut [(usize, f32)]) {
    neighbors.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}
