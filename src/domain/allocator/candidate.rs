use std::collections::BTreeMap;

use crate::domain::cluster::node::NodeKey;
use crate::domain::cluster::resource::ResourceKey;
use crate::domain::cluster::working_set::WorkingSet;
use crate::domain::utils::score::Score;

/// Node -> score for one resource. A node missing from the table may never host the resource.
pub type CandidateTable = BTreeMap<NodeKey, Score>;

/// Builds the candidate table of `rsc` from everything except colocation.
///
/// In a symmetric cluster every node starts at its base score. Otherwise nodes only enter
/// through location constraints. Nodes that cannot run resources end at `-INFINITY`.
pub fn candidate_table(ws: &WorkingSet, rsc: ResourceKey) -> CandidateTable {
    let resource = &ws.resources[rsc];
    let mut table = CandidateTable::new();

    if ws.options.symmetric_cluster {
        for (key, node) in ws.nodes.iter() {
            table.insert(key, node.base_score());
        }
    }

    for index in &resource.locations {
        let constraint = &ws.locations[*index];
        for (key, node) in ws.nodes.iter() {
            let applies = match (&constraint.node, &constraint.rule) {
                (Some(target), _) => *target == key,
                (None, Some(rule)) => node.matches(rule),
                (None, None) => true,
            };
            if applies {
                let entry = table.entry(key).or_insert_with(|| node.base_score());
                *entry = entry.merge(constraint.score);
            }
        }
    }

    for (key, node) in ws.nodes.iter() {
        if !node.can_run_resources() {
            table.insert(key, Score::NEGATIVE_INFINITY);
        }
    }

    let mut sticky_nodes = resource.running_on.clone();
    sticky_nodes.dedup();
    for node in sticky_nodes {
        if let Some(entry) = table.get_mut(&node) {
            *entry = entry.merge(resource.stickiness);
        }
    }

    for (node, count) in &resource.fail_counts {
        if let Some(entry) = table.get_mut(node) {
            *entry = entry.merge(resource.fail_stickiness.times(i64::from(*count)));
        }
    }

    table
}

/// Nodes of the table that may host the resource, best first.
///
/// Ties are broken by node weight (higher first), then by node id.
pub fn ranked_nodes(ws: &WorkingSet, table: &CandidateTable) -> Vec<NodeKey> {
    let mut nodes: Vec<(NodeKey, Score)> = table.iter().filter(|(_, score)| is_eligible(**score)).map(|(k, s)| (*k, *s)).collect();
    nodes.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .cmp(score_a)
            .then_with(|| ws.nodes[*b].weight.cmp(&ws.nodes[*a].weight))
            .then_with(|| ws.nodes[*a].id.cmp(&ws.nodes[*b].id))
    });
    nodes.into_iter().map(|(k, _)| k).collect()
}

/// Negative scores mean "rather not": the resource stays stopped instead.
pub fn is_eligible(score: Score) -> bool {
    score.value() >= 0
}
