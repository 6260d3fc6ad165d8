//! Cycle prevention (§4.G): a subscription request `A→B` is rejected if
//! the existing subscription graph already contains a path `B→…→A`. Pure
//! graph logic, no storage dependency, so it's exercised directly without
//! any fixture.

use kx_core::ids::NotebookId;
use petgraph::algo::has_path_connecting;
use petgraph::graph::DiGraph;

/// `edges` is every existing active subscription as `(subscriber, source)`
/// — a directed edge meaning "subscriber pulls from source". Returns
/// `true` if adding `subscriber -> source` would close a cycle, i.e. a
/// path `source -> ... -> subscriber` already exists.
pub fn would_create_cycle(
    edges: &[(NotebookId, NotebookId)],
    subscriber: NotebookId,
    source: NotebookId,
) -> bool {
    if subscriber == source {
        return true;
    }

    let mut graph = DiGraph::<NotebookId, ()>::new();
    let mut index = std::collections::HashMap::new();
    let mut node_for = |g: &mut DiGraph<NotebookId, ()>, id: NotebookId| {
        *index.entry(id).or_insert_with(|| g.add_node(id))
    };

    for &(from, to) in edges {
        let f = node_for(&mut graph, from);
        let t = node_for(&mut graph, to);
        graph.add_edge(f, t, ());
    }

    let (Some(&source_idx), Some(&subscriber_idx)) = (index.get(&source), index.get(&subscriber)) else {
        return false;
    };
    has_path_connecting(&graph, source_idx, subscriber_idx, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nb(n: u8) -> NotebookId {
        NotebookId(uuid::Uuid::from_bytes([n; 16]))
    }

    #[test]
    fn no_existing_edges_never_cycles() {
        assert!(!would_create_cycle(&[], nb(1), nb(2)));
    }

    #[test]
    fn direct_reverse_edge_is_a_cycle() {
        let edges = [(nb(2), nb(1))];
        assert!(would_create_cycle(&edges, nb(1), nb(2)));
    }

    #[test]
    fn transitive_reverse_path_is_a_cycle() {
        let edges = [(nb(2), nb(3)), (nb(3), nb(1))];
        assert!(would_create_cycle(&edges, nb(1), nb(2)));
    }

    #[test]
    fn unrelated_edges_do_not_cycle() {
        let edges = [(nb(3), nb(4))];
        assert!(!would_create_cycle(&edges, nb(1), nb(2)));
    }

    #[test]
    fn self_subscription_is_rejected() {
        assert!(would_create_cycle(&[], nb(1), nb(1)));
    }
}
