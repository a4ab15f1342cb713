//! Boundary tracing of classified grids into polygons.
//!
//! Regions are maximal 4-connected runs of cells sharing a class. Each region
//! becomes one polygon: its outer boundary plus one hole per enclosed
//! foreign area. Boundaries follow cell edges, so polygons of neighbouring
//! regions share edges exactly and never overlap.
//!
//! Where a region touches itself only at a cell corner, tracing turns right,
//! which keeps the background on either side of that corner in separate
//! rings. The result is an exterior and a hole meeting at one point rather
//! than a self-touching ring.

use std::collections::{HashMap, VecDeque};

use geo_types::{Coord, LineString, Polygon};
use map_common::GeoTransform;
use tracing::debug;

use crate::bins::{ClassifiedGrid, MISSING_CLASS};
use crate::vector::{PolygonRecord, Shape};

const NO_LABEL: u32 = u32::MAX;

/// Pixel-corner coordinate (col, row).
type Vertex = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    North,
    East,
    South,
    West,
}

impl Dir {
    fn right(self) -> Dir {
        match self {
            Dir::South => Dir::West,
            Dir::West => Dir::North,
            Dir::North => Dir::East,
            Dir::East => Dir::South,
        }
    }

    fn left(self) -> Dir {
        match self {
            Dir::South => Dir::East,
            Dir::East => Dir::North,
            Dir::North => Dir::West,
            Dir::West => Dir::South,
        }
    }
}

/// Directed boundary edge with its region on the left.
#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
    dir: Dir,
}

struct Region {
    class: u32,
    cells: Vec<usize>,
}

/// Trace every region of `grid` into a [`PolygonRecord`].
///
/// Records are ordered by the row-major position of each region's first
/// cell; missing cells produce no geometry.
pub fn polygonize(grid: &ClassifiedGrid, transform: &GeoTransform) -> Vec<PolygonRecord> {
    let (labels, regions) = label_regions(grid);
    debug!(regions = regions.len(), "Labelled class regions");

    regions
        .iter()
        .enumerate()
        .map(|(label, region)| {
            let edges = boundary_edges(grid, &labels, label as u32, &region.cells);
            let rings = trace_rings(&edges);
            PolygonRecord {
                geometry: Shape::Polygon(build_polygon(rings, transform)),
                class_value: region.class,
            }
        })
        .collect()
}

/// Flood-fill 4-connected regions in row-major order.
fn label_regions(grid: &ClassifiedGrid) -> (Vec<u32>, Vec<Region>) {
    let (width, height) = (grid.width(), grid.height());
    let classes = grid.classes();
    let mut labels = vec![NO_LABEL; classes.len()];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..classes.len() {
        let class = classes[seed];
        if class == MISSING_CLASS || labels[seed] != NO_LABEL {
            continue;
        }
        let label = regions.len() as u32;
        let mut cells = Vec::new();
        labels[seed] = label;
        queue.push_back(seed);

        while let Some(idx) = queue.pop_front() {
            cells.push(idx);
            let (col, row) = (idx % width, idx / width);
            let mut visit = |n: usize| {
                if labels[n] == NO_LABEL && classes[n] == class {
                    labels[n] = label;
                    queue.push_back(n);
                }
            };
            if col > 0 {
                visit(idx - 1);
            }
            if col + 1 < width {
                visit(idx + 1);
            }
            if row > 0 {
                visit(idx - width);
            }
            if row + 1 < height {
                visit(idx + width);
            }
        }

        cells.sort_unstable();
        regions.push(Region { class, cells });
    }

    (labels, regions)
}

/// Cell edges separating the region from anything else.
fn boundary_edges(grid: &ClassifiedGrid, labels: &[u32], label: u32, cells: &[usize]) -> Vec<Edge> {
    let (width, height) = (grid.width(), grid.height());
    let inside = |col: isize, row: isize| {
        col >= 0
            && row >= 0
            && (col as usize) < width
            && (row as usize) < height
            && labels[row as usize * width + col as usize] == label
    };

    let mut edges = Vec::new();
    for &idx in cells {
        let (col, row) = (idx % width, idx / width);
        let (c, r) = (col as isize, row as isize);
        if !inside(c - 1, r) {
            edges.push(Edge { from: (col, row), to: (col, row + 1), dir: Dir::South });
        }
        if !inside(c, r + 1) {
            edges.push(Edge { from: (col, row + 1), to: (col + 1, row + 1), dir: Dir::East });
        }
        if !inside(c + 1, r) {
            edges.push(Edge { from: (col + 1, row + 1), to: (col + 1, row), dir: Dir::North });
        }
        if !inside(c, r - 1) {
            edges.push(Edge { from: (col + 1, row), to: (col, row), dir: Dir::West });
        }
    }
    edges
}

/// Chain edges into closed rings of corner vertices.
fn trace_rings(edges: &[Edge]) -> Vec<Vec<Vertex>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let successor = |i: usize| -> Option<usize> {
        let edge = edges[i];
        let candidates = outgoing.get(&edge.to)?;
        [edge.dir.right(), edge.dir, edge.dir.left()]
            .into_iter()
            .find_map(|want| candidates.iter().copied().find(|&c| edges[c].dir == want))
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut chain = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            chain.push(current);
            match successor(current) {
                Some(next) if next == start => break,
                Some(next) if !used[next] => current = next,
                _ => {
                    debug_assert!(false, "open boundary chain at edge {}", current);
                    break;
                }
            }
        }

        // Keep only vertices where the direction changes.
        let n = chain.len();
        let ring: Vec<Vertex> = (0..n)
            .filter(|&k| edges[chain[k]].dir != edges[chain[(k + n - 1) % n]].dir)
            .map(|k| edges[chain[k]].from)
            .collect();
        if ring.len() >= 4 {
            rings.push(ring);
        }
    }
    rings
}

/// Twice the signed area of a vertex ring (shoelace).
fn doubled_area(points: &[(f64, f64)]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

/// Map a pixel ring to a closed geographic ring with the requested winding.
fn to_line_string(ring: &[Vertex], transform: &GeoTransform, counter_clockwise: bool) -> LineString<f64> {
    let mut points: Vec<(f64, f64)> = ring
        .iter()
        .map(|&(x, y)| transform.pixel_to_geo(x as f64, y as f64))
        .collect();
    if (doubled_area(&points) > 0.0) != counter_clockwise {
        points.reverse();
    }
    let mut coords: Vec<Coord<f64>> = points.into_iter().map(|(x, y)| Coord { x, y }).collect();
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    LineString::new(coords)
}

/// The ring enclosing the largest area is the exterior; the rest are holes.
fn build_polygon(rings: Vec<Vec<Vertex>>, transform: &GeoTransform) -> Polygon<f64> {
    let pixel_area = |ring: &Vec<Vertex>| {
        let points: Vec<(f64, f64)> = ring.iter().map(|&(x, y)| (x as f64, y as f64)).collect();
        doubled_area(&points).abs()
    };
    let outer = rings
        .iter()
        .enumerate()
        .max_by(|a, b| pixel_area(a.1).total_cmp(&pixel_area(b.1)))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut exterior = LineString::new(vec![]);
    let mut holes = Vec::with_capacity(rings.len().saturating_sub(1));
    for (i, ring) in rings.iter().enumerate() {
        if i == outer {
            exterior = to_line_string(ring, transform, true);
        } else {
            holes.push(to_line_string(ring, transform, false));
        }
    }
    Polygon::new(exterior, holes)
}
