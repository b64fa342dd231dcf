//! In-memory article graph and all-shortest-paths search.
//!
//! The adjacency list is built once from the resolved edge list and is
//! immutable afterwards, so searches can run concurrently against a
//! shared reference without synchronization.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error};

use crate::models::{Link, Page, ReadProgress};
use crate::progress::{BfsProgress, BfsProgressFn, ProgressFn, Throttle};

const UNREACHED: u32 = u32::MAX;

pub struct PageGraph {
    pages: Vec<Page>,
    adjacency: Vec<Vec<u32>>,
    link_count: u64,
}

struct BfsOutcome {
    /// Shortest-path predecessors per node, empty until the first one
    /// is recorded.
    parents: Vec<Vec<u32>>,
    /// Distance of the end node, `UNREACHED` if the search never got
    /// there.
    end_distance: u32,
}

impl PageGraph {
    /// Consume the loader output and build the adjacency list: one
    /// pass to count out-degrees, one to reserve each row, one to
    /// append destinations. The edge list is dropped on return.
    ///
    /// Panics if an edge references an index outside the page vector;
    /// the loaders only emit resolved indices, so that is a bug, not
    /// bad input.
    pub fn build(
        pages: Vec<Page>,
        links: Vec<Link>,
        refresh_rate: Duration,
        on_progress: Option<&ProgressFn>,
    ) -> Self {
        let mut out_degree = vec![0u32; pages.len()];
        for link in &links {
            assert!(
                (link.from as usize) < pages.len() && (link.to as usize) < pages.len(),
                "edge ({}, {}) out of range for {} pages",
                link.from,
                link.to,
                pages.len()
            );
            out_degree[link.from as usize] += 1;
        }

        let mut adjacency: Vec<Vec<u32>> = out_degree
            .into_iter()
            .map(|degree| Vec::with_capacity(degree as usize))
            .collect();

        let total = links.len() as u64;
        let mut throttle = Throttle::new(refresh_rate);
        let mut inserted = 0u64;
        for link in &links {
            adjacency[link.from as usize].push(link.to);
            inserted += 1;
            throttle.tick(
                inserted,
                ReadProgress {
                    total_bytes: total,
                    current_bytes: inserted,
                },
                on_progress,
                false,
            );
        }
        throttle.tick(
            inserted,
            ReadProgress {
                total_bytes: total,
                current_bytes: inserted,
            },
            on_progress,
            true,
        );

        debug!(pages = pages.len(), links = inserted, "graph constructed");
        Self {
            pages,
            adjacency,
            link_count: inserted,
        }
    }

    pub fn page(&self, index: u32) -> Option<&Page> {
        self.pages.get(index as usize)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn link_count(&self) -> u64 {
        self.link_count
    }

    /// Outgoing destinations of a page, in dump order; empty for an
    /// out-of-range index.
    pub fn neighbors(&self, index: u32) -> &[u32] {
        self.adjacency
            .get(index as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Breadth-first search from `start`, recording every shortest
    /// predecessor. The search does not stop the moment `end` is
    /// reached: the rest of its layer may still contribute
    /// predecessors, so it finishes the layer and then stops.
    fn bfs_with_parents(
        &self,
        start: u32,
        end: u32,
        refresh_rate: Duration,
        on_progress: Option<&BfsProgressFn>,
    ) -> BfsOutcome {
        let node_count = self.adjacency.len();
        let mut dist = vec![UNREACHED; node_count];
        let mut parents: Vec<Vec<u32>> = vec![Vec::new(); node_count];
        let mut queue = VecDeque::new();

        dist[start as usize] = 0;
        queue.push_back(start);

        let mut current_layer = 0u32;
        let mut layer_size = 1u32;
        let mut layer_explored = 0u32;
        let mut total_explored = 0u32;
        let mut throttle = Throttle::new(refresh_rate);

        let emit = |progress: BfsProgress| {
            if let Some(callback) = on_progress {
                callback(progress);
            }
        };

        while let Some(node) = queue.pop_front() {
            if dist[node as usize] > current_layer {
                // the previous layer is complete, so stopping is safe
                // once the end node has a distance
                if dist[end as usize] != UNREACHED {
                    break;
                }
                current_layer = dist[node as usize];
                // the node just popped belongs to the new layer too
                layer_size = queue.len() as u32 + 1;
                total_explored += layer_explored;
                layer_explored = 0;

                throttle.should_fire(true);
                emit(BfsProgress {
                    current_layer,
                    layer_size,
                    layer_explored,
                    total_explored,
                });
                debug!(
                    layer = current_layer,
                    layer_size, total_explored, "search advanced a layer"
                );
            }

            let next_dist = dist[node as usize] + 1;
            for &neighbor in &self.adjacency[node as usize] {
                let ni = neighbor as usize;
                if dist[ni] == UNREACHED {
                    dist[ni] = next_dist;
                    parents[ni].push(node);
                    queue.push_back(neighbor);
                } else if dist[ni] == next_dist && parents[ni].last() != Some(&node) {
                    // a node's duplicate out-edges arrive back to
                    // back, so checking the tail is enough to keep the
                    // predecessor list duplicate-free
                    parents[ni].push(node);
                }
            }

            layer_explored += 1;
            if throttle.should_fire(false) {
                emit(BfsProgress {
                    current_layer,
                    layer_size,
                    layer_explored,
                    total_explored: total_explored + layer_explored,
                });
            }
        }

        emit(BfsProgress {
            current_layer,
            layer_size,
            layer_explored,
            total_explored: total_explored + layer_explored,
        });

        BfsOutcome {
            parents,
            end_distance: dist[end as usize],
        }
    }

    /// Every shortest path from `start` to `end`, each read start to
    /// end. Empty when the end is unreachable or an endpoint is out of
    /// range; `start == end` yields one zero-length path.
    pub fn all_shortest_paths(
        &self,
        start: u32,
        end: u32,
        refresh_rate: Duration,
        on_progress: Option<&BfsProgressFn>,
    ) -> Vec<Vec<u32>> {
        let node_count = self.adjacency.len();
        if start as usize >= node_count || end as usize >= node_count {
            error!(
                start,
                end,
                pages = node_count,
                "search endpoint out of range"
            );
            return Vec::new();
        }

        let outcome = self.bfs_with_parents(start, end, refresh_rate, on_progress);
        if outcome.end_distance == UNREACHED {
            return Vec::new();
        }
        debug!(
            distance = outcome.end_distance,
            "backtracking all shortest paths"
        );

        // Depth-first backtracking with an explicit stack; shortest
        // paths through a large graph can be long enough to make
        // recursion risky.
        let mut paths = Vec::new();
        let mut stack = vec![vec![end]];
        while let Some(mut path) = stack.pop() {
            let Some(&node) = path.last() else { continue };
            if node == start {
                path.reverse();
                paths.push(path);
                continue;
            }
            for &parent in &outcome.parents[node as usize] {
                let mut extended = path.clone();
                extended.push(parent);
                stack.push(extended);
            }
        }
        paths
    }
}
