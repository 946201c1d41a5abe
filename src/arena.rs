//! The columnar population store (`spec.md` §3, §4.A).
//!
//! A generation lives as three parallel column groups (species, networks, connections) linked
//! by half-open integer ranges rather than nested owned collections. Nodes are never stored:
//! node `k` of a network is an input if `k < input_count`, an output if
//! `input_count <= k < input_count + output_count`, else hidden. Cloning a genome is therefore
//! just copying a `[conn_begin, conn_end)` range across three flat columns, never a graph walk.

use core::ops::Range;

pub type NodeIndex = u32;

/// `{enabled: bit, innovation_number: integer}` packed into a single machine word, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionInfo(u64);

impl ConnectionInfo {
    const ENABLED_BIT: u64 = 1 << 63;

    pub fn new(enabled: bool, innovation: u64) -> Self {
        debug_assert!(
            innovation < Self::ENABLED_BIT,
            "innovation number {innovation} overflows the packed field"
        );
        let bits = innovation | if enabled { Self::ENABLED_BIT } else { 0 };
        Self(bits)
    }

    #[inline]
    pub fn enabled(self) -> bool {
        self.0 & Self::ENABLED_BIT != 0
    }

    #[inline]
    pub fn innovation(self) -> u64 {
        self.0 & !Self::ENABLED_BIT
    }

    #[inline]
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.0 |= Self::ENABLED_BIT;
        } else {
            self.0 &= !Self::ENABLED_BIT;
        }
    }
}

/// One network's hidden-node count and its half-open slice into the connection columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkRecord {
    pub hidden_node_count: u32,
    pub conn_begin: u32,
    pub conn_end: u32,
}

impl NetworkRecord {
    pub fn conn_range(&self) -> Range<usize> {
        self.conn_begin as usize..self.conn_end as usize
    }

    pub fn connection_count(&self) -> usize {
        (self.conn_end - self.conn_begin) as usize
    }
}

/// One species' half-open slice into the network columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeciesRecord {
    pub network_begin: u32,
    pub network_end: u32,
}

impl SpeciesRecord {
    pub fn network_range(&self) -> Range<usize> {
        self.network_begin as usize..self.network_end as usize
    }

    pub fn size(&self) -> usize {
        (self.network_end - self.network_begin) as usize
    }
}

/// A read-only view of a single connection, gathered from the four parallel columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionRef {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub weight: f64,
    pub info: ConnectionInfo,
}

impl ConnectionRef {
    #[inline]
    pub fn enabled(self) -> bool {
        self.info.enabled()
    }

    #[inline]
    pub fn innovation(self) -> u64 {
        self.info.innovation()
    }
}

/// One generation of a population: a columnar arena of species, networks, and connections.
#[derive(Debug, Default)]
pub struct Population {
    pub species: Vec<SpeciesRecord>,
    pub networks: Vec<NetworkRecord>,
    pub conn_from: Vec<NodeIndex>,
    pub conn_to: Vec<NodeIndex>,
    pub conn_weight: Vec<f64>,
    pub conn_info: Vec<ConnectionInfo>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// An initial generation of `population_size` networks with zero hidden nodes and zero
    /// connections, all belonging to a single species (§6, `Trainer::new`).
    pub fn seed(population_size: usize) -> Self {
        Self {
            species: vec![SpeciesRecord {
                network_begin: 0,
                network_end: population_size as u32,
            }],
            networks: vec![NetworkRecord::default(); population_size],
            conn_from: Vec::new(),
            conn_to: Vec::new(),
            conn_weight: Vec::new(),
            conn_info: Vec::new(),
        }
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    pub fn connection_count(&self) -> usize {
        self.conn_from.len()
    }

    #[inline]
    pub fn connection(&self, idx: usize) -> ConnectionRef {
        ConnectionRef {
            from: self.conn_from[idx],
            to: self.conn_to[idx],
            weight: self.conn_weight[idx],
            info: self.conn_info[idx],
        }
    }

    /// The connections belonging to `network`, in storage order (invariant #4: ascending
    /// innovation number).
    pub fn connections_of(&self, network: &NetworkRecord) -> impl Iterator<Item = ConnectionRef> + '_ {
        network.conn_range().map(move |idx| self.connection(idx))
    }

    /// Reserve (but do not initialize) room for `connection_count` connections, growing every
    /// connection column in lockstep. Used once per generation to size the offspring arena
    /// before any worker writes to it, so that every worker's segment is a disjoint, already-
    /// allocated slice (§5).
    pub fn reserve_connections(&mut self, connection_count: usize) {
        self.conn_from = vec![0; connection_count];
        self.conn_to = vec![0; connection_count];
        self.conn_weight = vec![0.0; connection_count];
        self.conn_info = vec![ConnectionInfo::default(); connection_count];
    }

    pub fn reserve_networks(&mut self, network_count: usize) {
        self.networks = vec![NetworkRecord::default(); network_count];
    }

    /// Clear species buckets; re-populated by the species sorter at the end of `evolve`.
    pub fn clear_species(&mut self) {
        self.species.clear();
    }
}

/// An owned, not-yet-committed network produced by a mutation or crossover operator. The
/// orchestrator only knows how many connections every offspring in the next generation needs
/// once every draft exists, so drafts are built independently (and in parallel) and committed
/// into the arena's connection columns afterwards, each into its own pre-reserved, disjoint
/// range (§5).
#[derive(Debug, Clone, Default)]
pub struct GenomeDraft {
    pub hidden_node_count: u32,
    /// `(from, to, weight, info)`, sorted by ascending innovation number (invariant #4).
    pub genes: Vec<(NodeIndex, NodeIndex, f64, ConnectionInfo)>,
}

impl GenomeDraft {
    pub fn connection_count(&self) -> usize {
        self.genes.len()
    }

    /// Copy this draft's genes into a disjoint slice of the arena's connection columns.
    pub fn write_into(&self, from: &mut [NodeIndex], to: &mut [NodeIndex], weight: &mut [f64], info: &mut [ConnectionInfo]) {
        for (i, &(f, t, w, c)) in self.genes.iter().enumerate() {
            from[i] = f;
            to[i] = t;
            weight[i] = w;
            info[i] = c;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_info_roundtrip() {
        let info = ConnectionInfo::new(true, 12345);
        assert!(info.enabled());
        assert_eq!(info.innovation(), 12345);

        let mut info = info;
        info.set_enabled(false);
        assert!(!info.enabled());
        assert_eq!(info.innovation(), 12345);
    }

    #[test]
    fn seed_population_is_one_species_no_connections() {
        let pop = Population::seed(10);
        assert_eq!(pop.species.len(), 1);
        assert_eq!(pop.species[0].network_range(), 0..10);
        assert_eq!(pop.network_count(), 10);
        assert_eq!(pop.connection_count(), 0);
        for net in &pop.networks {
            assert_eq!(net.hidden_node_count, 0);
            assert_eq!(net.connection_count(), 0);
        }
    }

    #[test]
    fn genome_draft_writes_into_disjoint_slice() {
        let draft = GenomeDraft {
            hidden_node_count: 0,
            genes: vec![
                (0, 2, 0.5, ConnectionInfo::new(true, 0)),
                (1, 2, -0.5, ConnectionInfo::new(false, 1)),
            ],
        };
        let mut from = vec![0; 2];
        let mut to = vec![0; 2];
        let mut weight = vec![0.0; 2];
        let mut info = vec![ConnectionInfo::default(); 2];
        draft.write_into(&mut from, &mut to, &mut weight, &mut info);
        assert_eq!(from, vec![0, 1]);
        assert_eq!(to, vec![2, 2]);
        assert_eq!(weight, vec![0.5, -0.5]);
        assert!(info[0].enabled());
        assert!(!info[1].enabled());
    }
}
