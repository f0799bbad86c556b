//! Region store construction
//!
//! The builder takes region records and auxiliary edges from a data source
//! and produces a consistent [`RegionStore`]:
//!
//! 1. duplicate ids, dangling parents and multiple roots are rejected
//! 2. missing levels are inferred by walking the parent chain
//! 3. declared levels that disagree with the chain are rejected, or
//!    repaired when `repair_levels` is set
//! 4. a `default` edge is synthesised for every primary parent link
//! 5. edges are deduplicated and indexed per relation, and each relation is
//!    checked for nodes with several parents and for cycles

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::error::{Result, StructuralError};
use crate::types::{HierarchyEdge, Region, RegionId, RegionRecord, DEFAULT_RELATION};

use super::fold_key;
use super::store::{
    find_cycles, relation_depth, RegionStore, RelationDiagnostics, RelationIndex,
};

/// Longest parent chain walked while inferring a level
pub const MAX_PARENT_CHAIN: usize = 100;

/// Builder for [`RegionStore`] snapshots
#[derive(Debug, Clone, Default)]
pub struct RegionStoreBuilder {
    records: Vec<RegionRecord>,
    edges: Vec<HierarchyEdge>,
    repair_levels: bool,
    skip_default_edges: bool,
}

impl RegionStoreBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region with a known level
    pub fn region(mut self, region: Region) -> Self {
        self.records.push(region.into());
        self
    }

    /// Add a region record (level optional)
    pub fn record(mut self, record: RegionRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Add many region records
    pub fn records(mut self, records: impl IntoIterator<Item = RegionRecord>) -> Self {
        self.records.extend(records);
        self
    }

    /// Add an auxiliary edge
    pub fn edge(mut self, edge: HierarchyEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Add many auxiliary edges
    pub fn edges(mut self, edges: impl IntoIterator<Item = HierarchyEdge>) -> Self {
        self.edges.extend(edges);
        self
    }

    /// Repair inconsistent levels instead of rejecting them
    pub fn repair_levels(mut self, repair: bool) -> Self {
        self.repair_levels = repair;
        self
    }

    /// Do not synthesise `default` edges from primary parents
    pub fn without_default_edges(mut self) -> Self {
        self.skip_default_edges = true;
        self
    }

    /// Validate the input and build the snapshot
    pub fn build(self) -> Result<RegionStore> {
        let records = self.check_records()?;
        let levels = infer_levels(&records)?;

        let mut regions: HashMap<RegionId, Region> = HashMap::with_capacity(records.len());
        let mut repaired = 0usize;
        for record in records.into_values() {
            let inferred = levels.get(&record.id).copied().unwrap_or(0);
            if let Some(declared) = record.level {
                if declared != inferred {
                    if !self.repair_levels {
                        return Err(StructuralError::LevelMismatch {
                            id: record.id.clone(),
                            parent: record.parent().unwrap_or_default().to_string(),
                            declared,
                            expected: inferred,
                        }
                        .into());
                    }
                    warn!(id = %record.id, declared, inferred, "Repairing inconsistent level");
                    repaired += 1;
                }
            }
            let region = record.into_region(inferred);
            regions.insert(region.id.clone(), region);
        }

        let relations = build_relations(&regions, self.edges, !self.skip_default_edges);
        let store = index_store(regions, relations);

        for diag in store.diagnostics() {
            if !diag.is_clean() {
                warn!(
                    relation = %diag.relation,
                    multiple_parents = diag.multiple_parents.len(),
                    cycles = diag.cycles.len(),
                    dangling_edges = diag.dangling_edges.len(),
                    "Relation has structural problems"
                );
            }
        }
        info!(
            regions = store.len(),
            relations = store.relations().len(),
            max_level = store.max_level(),
            repaired_levels = repaired,
            "Region store built"
        );
        Ok(store)
    }

    fn check_records(&self) -> Result<BTreeMap<RegionId, RegionRecord>> {
        let mut records: BTreeMap<RegionId, RegionRecord> = BTreeMap::new();
        let mut folded: BTreeSet<String> = BTreeSet::new();
        for record in &self.records {
            if !folded.insert(fold_key(&record.id)) {
                return Err(StructuralError::DuplicateRegion(record.id.clone()).into());
            }
            records.insert(record.id.clone(), record.clone());
        }

        let mut roots = Vec::new();
        for record in records.values() {
            match record.parent() {
                None => roots.push(record.id.clone()),
                Some(parent) if !records.contains_key(parent) => {
                    return Err(StructuralError::UnknownParent {
                        id: record.id.clone(),
                        parent: parent.to_string(),
                    }
                    .into());
                },
                Some(_) => {},
            }
        }
        if roots.len() > 1 {
            return Err(StructuralError::MultipleRoots { roots }.into());
        }
        Ok(records)
    }
}

/// Level of every record, computed from the parent chain (root = 0)
fn infer_levels(records: &BTreeMap<RegionId, RegionRecord>) -> Result<HashMap<RegionId, u32>> {
    let mut levels: HashMap<RegionId, u32> = HashMap::with_capacity(records.len());

    for id in records.keys() {
        if levels.contains_key(id) {
            continue;
        }

        let mut chain: Vec<&str> = vec![id.as_str()];
        let base = loop {
            let Some(current) = chain.last().and_then(|c| records.get(*c)) else {
                break 0;
            };
            match current.parent() {
                None => break 0,
                Some(parent) => {
                    if let Some(&level) = levels.get(parent) {
                        break level + 1;
                    }
                    if chain.len() >= MAX_PARENT_CHAIN || chain.contains(&parent) {
                        return Err(StructuralError::ParentChainTooLong {
                            id: id.clone(),
                            bound: MAX_PARENT_CHAIN,
                        }
                        .into());
                    }
                    chain.push(parent);
                },
            }
        };

        // The last element of the chain sits at `base`, its children below it.
        for (depth, node) in chain.iter().rev().enumerate() {
            let level = base + depth as u32;
            if records.get(*node).is_some_and(|r| r.level.is_none()) {
                debug!(id = %node, level, "Inferred region level");
            }
            levels.insert(node.to_string(), level);
        }
    }

    Ok(levels)
}

fn build_relations(
    regions: &HashMap<RegionId, Region>,
    edges: Vec<HierarchyEdge>,
    synthesize_default: bool,
) -> BTreeMap<String, RelationIndex> {
    let mut unique: BTreeSet<HierarchyEdge> = BTreeSet::new();
    let mut dangling: BTreeMap<String, Vec<HierarchyEdge>> = BTreeMap::new();

    let input = edges.len();
    for edge in edges {
        if regions.contains_key(&edge.child_id) && regions.contains_key(&edge.parent_id) {
            unique.insert(edge);
        } else {
            warn!(edge = %edge, "Dropping edge with unknown endpoint");
            dangling.entry(edge.relation.clone()).or_default().push(edge);
        }
    }

    if synthesize_default {
        let before = unique.len();
        for region in regions.values() {
            if let Some(parent) = &region.parent_id {
                unique.insert(HierarchyEdge::new(&region.id, parent, DEFAULT_RELATION));
            }
        }
        debug!(
            synthesized = unique.len() - before,
            "Synthesised default edges from primary parents"
        );
    }
    debug!(input, unique = unique.len(), "Deduplicated hierarchy edges");

    let mut relations: BTreeMap<String, RelationIndex> = BTreeMap::new();
    for edge in unique {
        let index = relations.entry(edge.relation.clone()).or_default();
        index
            .parents
            .entry(edge.child_id.clone())
            .or_default()
            .push(edge.parent_id.clone());
        index
            .children
            .entry(edge.parent_id.clone())
            .or_default()
            .push(edge.child_id.clone());
        index.edges.push(edge);
    }
    for (relation, edges) in dangling {
        relations
            .entry(relation)
            .or_default()
            .diagnostics
            .dangling_edges = edges;
    }

    for (relation, index) in relations.iter_mut() {
        for list in index.parents.values_mut().chain(index.children.values_mut()) {
            list.sort();
        }
        let cycles = find_cycles(&index.parents);
        for (i, cycle) in cycles.iter().enumerate() {
            for node in cycle {
                index.cycle_of.insert(node.clone(), i);
            }
        }
        index.depth = relation_depth(&index.parents, &index.cycle_of);
        index.diagnostics = RelationDiagnostics {
            relation: relation.clone(),
            edge_count: index.edges.len(),
            multiple_parents: index
                .parents
                .iter()
                .filter(|(_, ps)| ps.len() > 1)
                .map(|(c, ps)| (c.clone(), ps.clone()))
                .collect(),
            cycles,
            dangling_edges: std::mem::take(&mut index.diagnostics.dangling_edges),
        };
    }
    relations
}

fn index_store(
    regions: HashMap<RegionId, Region>,
    relations: BTreeMap<String, RelationIndex>,
) -> RegionStore {
    let mut store = RegionStore {
        relations,
        ..RegionStore::default()
    };

    let mut ids: Vec<RegionId> = regions.keys().cloned().collect();
    ids.sort();

    for id in &ids {
        let Some(region) = regions.get(id) else {
            continue;
        };
        store.folded_ids.insert(fold_key(id), id.clone());
        store.max_level = store.max_level.max(region.level);

        let add = |index: &mut HashMap<String, Vec<RegionId>>, key: &Option<String>| {
            if let Some(key) = key {
                index.entry(key.clone()).or_default().push(id.clone());
            }
        };
        add(&mut store.by_short_code, &region.short_code);
        add(&mut store.by_long_code, &region.long_code);
        add(&mut store.by_numeric_code, &region.numeric_code);
        add(&mut store.by_name, &Some(fold_key(&region.name)));
        add(&mut store.by_country, &region.country_id);
        add(&mut store.primary_children, &region.parent_id);
    }

    store.ordered_ids = ids;
    store.regions = regions;
    store
}
