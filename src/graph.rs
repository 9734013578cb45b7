//! Module for analysing the connectivity of a network
use crate::error::ModelError;
use crate::id::BusID;
use crate::network::Network;
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use log::warn;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{NodeIndex, UnGraph};

/// An undirected graph with a node per bus and an edge per link
type BusGraph = UnGraph<BusID, ()>;

fn create_bus_graph(network: &Network) -> BusGraph {
    let mut graph = BusGraph::new_undirected();
    let nodes: IndexMap<&BusID, NodeIndex> = network
        .buses()
        .keys()
        .map(|id| (id, graph.add_node(id.clone())))
        .collect();
    for link in network.links().values() {
        graph.add_edge(nodes[&link.bus0], nodes[&link.bus1], ());
    }

    graph
}

/// Get the groups of buses which are connected to one another by links.
///
/// Islands are returned in the order their first bus was added.
pub fn find_islands(network: &Network) -> Vec<Vec<BusID>> {
    let graph = create_bus_graph(network);
    let mut islands: Vec<Vec<NodeIndex>> = tarjan_scc(&graph);
    for island in &mut islands {
        island.sort_unstable();
    }
    islands.sort_unstable_by_key(|island| island[0]);

    islands
        .into_iter()
        .map(|island| island.into_iter().map(|node| graph[node].clone()).collect())
        .collect()
}

/// Check that every island with demand has something which can supply it.
///
/// A network which is split into several islands is valid, but suspicious, so causes a warning.
pub fn validate_network_connectivity(network: &Network) -> Result<()> {
    let islands = find_islands(network);
    if islands.len() > 1 {
        warn!(
            "Network is split into {} islands which are not connected by links",
            islands.len()
        );
    }

    for island in &islands {
        let has_demand = island.iter().any(|bus| {
            network
                .bus_demand(bus)
                .iter()
                .any(|demand| demand.value() > 0.0)
        });
        let has_supply = network
            .generators()
            .values()
            .map(|generator| &generator.bus)
            .chain(network.storage_units().values().map(|storage| &storage.bus))
            .any(|bus| island.contains(bus));

        ensure!(
            !has_demand || has_supply,
            ModelError::Configuration(format!(
                "Demand at bus(es) {} cannot be supplied: no generator or storage unit is \
                connected",
                island.iter().join(", ")
            ))
        );
    }

    Ok(())
}
