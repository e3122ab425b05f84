use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use union_find::{QuickUnionUf, UnionBySize, UnionFind};

use crate::domain::allocator::candidate::CandidateTable;
use crate::domain::cluster::node::NodeKey;
use crate::domain::cluster::resource::ResourceKey;
use crate::domain::cluster::working_set::WorkingSet;
use crate::domain::utils::score::Score;
use crate::error::{Error, Result};

/// Order in which resources are placed: every primary before its dependents.
///
/// Among resources that are ready at the same time, higher priority goes first, then definition order.
/// A colocation cycle is a configuration error naming the resources on the cycle.
pub fn resolution_order(ws: &WorkingSet) -> Result<Vec<ResourceKey>> {
    let resources = ws.allocatable_resources();
    let ordinal: HashMap<ResourceKey, usize> = resources.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    // 1. Build the colocation graph primary -> dependent
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); resources.len()];
    let mut primaries: Vec<Vec<usize>> = vec![Vec::new(); resources.len()];
    let mut in_degree = vec![0usize; resources.len()];
    for colocation in &ws.colocations {
        let (Some(&primary), Some(&dependent)) = (ordinal.get(&colocation.primary), ordinal.get(&colocation.dependent)) else {
            continue;
        };
        dependents[primary].push(dependent);
        primaries[dependent].push(primary);
        in_degree[dependent] += 1;
    }

    // 2. Kahn's algorithm with a priority-ordered ready set
    let priority_of = |i: usize| ws.resources[resources[i]].priority;
    let mut ready: BTreeSet<(Reverse<i64>, usize)> =
        (0..resources.len()).filter(|i| in_degree[*i] == 0).map(|i| (Reverse(priority_of(i)), i)).collect();
    let mut order = Vec::with_capacity(resources.len());

    while let Some(next) = ready.pop_first() {
        let index = next.1;
        order.push(resources[index]);
        for dependent in &dependents[index] {
            in_degree[*dependent] -= 1;
            if in_degree[*dependent] == 0 {
                ready.insert((Reverse(priority_of(*dependent)), *dependent));
            }
        }
    }

    if order.len() == resources.len() {
        return Ok(order);
    }

    // 3. Every leftover resource has a leftover primary, so walking primaries must revisit one
    let start = (0..resources.len()).find(|i| in_degree[*i] > 0).unwrap_or(0);
    let mut path = vec![start];
    let cycle_start = loop {
        let current = *path.last().unwrap_or(&start);
        let Some(primary) = primaries[current].iter().copied().find(|p| in_degree[*p] > 0) else {
            break 0;
        };
        if let Some(position) = path.iter().position(|p| *p == primary) {
            break position;
        }
        path.push(primary);
    };
    let mut cycle: Vec<String> = path[cycle_start..].iter().rev().map(|i| ws.resource_name(resources[*i]).to_string()).collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    log::error!("Colocation constraints form a cycle: {}", cycle.join(" -> "));
    Err(Error::ColocationCycle(cycle))
}

/// Groups of resources tied together by `+INFINITY` colocations.
pub fn mandatory_sets(ws: &WorkingSet) -> Vec<Vec<ResourceKey>> {
    let resources = ws.allocatable_resources();
    let index: HashMap<ResourceKey, usize> = resources.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    let mut dsu = QuickUnionUf::<UnionBySize>::new(resources.len());
    for colocation in ws.colocations.iter().filter(|c| c.score.is_positive_infinity()) {
        if let (Some(&a), Some(&b)) = (index.get(&colocation.dependent), index.get(&colocation.primary)) {
            dsu.union(a, b);
        }
    }

    let mut sets: Vec<Vec<ResourceKey>> = Vec::new();
    let mut set_of_root: HashMap<usize, usize> = HashMap::new();
    for (i, key) in resources.iter().enumerate() {
        let root = dsu.find(i);
        let set = *set_of_root.entry(root).or_insert_with(|| {
            sets.push(Vec::new());
            sets.len() - 1
        });
        sets[set].push(*key);
    }
    sets.retain(|set| set.len() > 1);
    sets
}

/// Shares `-INFINITY` bans inside each mandatory set, so no member is placed where a partner can never follow.
///
/// A ban that would leave a member with no usable node at all is not shared: a resource that cannot
/// run anywhere must not take its partners down with it.
pub fn share_bans(ws: &WorkingSet, tables: &mut HashMap<ResourceKey, CandidateTable>) {
    for set in mandatory_sets(ws) {
        let banned: BTreeSet<NodeKey> = set
            .iter()
            .filter_map(|rsc| tables.get(rsc))
            .filter(|table| table.values().any(|s| s.is_allowed()))
            .flat_map(|table| table.iter().filter(|(_, s)| s.is_negative_infinity()).map(|(k, _)| *k))
            .collect();
        if banned.is_empty() {
            continue;
        }

        for rsc in &set {
            let Some(table) = tables.get_mut(rsc) else {
                continue;
            };
            let keeps_a_node = table.iter().any(|(node, score)| score.is_allowed() && !banned.contains(node));
            if !keeps_a_node {
                log::debug!("Not sharing colocation bans with {}: it would have no node left", ws.resource_name(*rsc));
                continue;
            }
            for node in &banned {
                table.insert(*node, Score::NEGATIVE_INFINITY);
            }
        }
    }
}

/// Applies a colocation of the resource owning `table` with a primary placed on `primary_nodes`.
pub fn apply_colocation(table: &mut CandidateTable, primary_nodes: &[NodeKey], score: Score) {
    if score.is_positive_infinity() {
        for (node, entry) in table.iter_mut() {
            if !primary_nodes.contains(node) {
                *entry = Score::NEGATIVE_INFINITY;
            }
        }
        return;
    }

    for node in primary_nodes {
        if let Some(entry) = table.get_mut(node) {
            *entry = entry.merge(score);
        }
    }
}
