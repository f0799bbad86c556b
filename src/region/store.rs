//! Immutable region snapshot with indexed lookups

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{HierarchyEdge, Region, RegionId};

use super::{fold_key, RegionFilter};

/// Problems found in one relation while building the store
///
/// These do not prevent the store from being built. Aggregation raises a
/// structural error as soon as it traverses an affected node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelationDiagnostics {
    /// Relation label
    pub relation: String,
    /// Number of edges in the relation
    pub edge_count: usize,
    /// Nodes with more than one parent, with all their parents
    pub multiple_parents: BTreeMap<RegionId, Vec<RegionId>>,
    /// Strongly connected components forming cycles
    pub cycles: Vec<Vec<RegionId>>,
    /// Edges dropped because an endpoint is not a known region
    pub dangling_edges: Vec<HierarchyEdge>,
}

impl RelationDiagnostics {
    /// Whether the relation is a well-formed forest
    pub fn is_clean(&self) -> bool {
        self.multiple_parents.is_empty() && self.cycles.is_empty() && self.dangling_edges.is_empty()
    }
}

/// Edges of one relation, indexed both ways
#[derive(Debug, Default)]
pub(super) struct RelationIndex {
    pub(super) edges: Vec<HierarchyEdge>,
    pub(super) parents: HashMap<RegionId, Vec<RegionId>>,
    pub(super) children: HashMap<RegionId, Vec<RegionId>>,
    pub(super) cycle_of: HashMap<RegionId, usize>,
    pub(super) depth: usize,
    pub(super) diagnostics: RelationDiagnostics,
}

/// Read-only registry snapshot
///
/// Lookups by id are case-insensitive; code lookups are exact and may be
/// scoped to a country.
#[derive(Debug, Default)]
pub struct RegionStore {
    pub(super) regions: HashMap<RegionId, Region>,
    pub(super) ordered_ids: Vec<RegionId>,
    pub(super) folded_ids: HashMap<String, RegionId>,
    pub(super) by_short_code: HashMap<String, Vec<RegionId>>,
    pub(super) by_long_code: HashMap<String, Vec<RegionId>>,
    pub(super) by_numeric_code: HashMap<String, Vec<RegionId>>,
    pub(super) by_name: HashMap<String, Vec<RegionId>>,
    pub(super) by_country: HashMap<RegionId, Vec<RegionId>>,
    pub(super) primary_children: HashMap<RegionId, Vec<RegionId>>,
    pub(super) relations: BTreeMap<String, RelationIndex>,
    pub(super) max_level: u32,
}

impl RegionStore {
    /// Number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Iterate over regions, sorted by id
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.ordered_ids.iter().filter_map(|id| self.regions.get(id))
    }

    /// Canonical spelling of an id, looked up case-insensitively
    pub fn canonical_id(&self, id: &str) -> Option<&RegionId> {
        if let Some((key, _)) = self.regions.get_key_value(id) {
            return Some(key);
        }
        self.folded_ids.get(&fold_key(id))
    }

    /// Whether the id exists (case-insensitive)
    pub fn contains(&self, id: &str) -> bool {
        self.canonical_id(id).is_some()
    }

    /// Get a region by id (case-insensitive)
    pub fn get(&self, id: &str) -> Result<&Region> {
        self.canonical_id(id)
            .and_then(|canonical| self.regions.get(canonical))
            .ok_or_else(|| Error::not_found(id))
    }

    /// Regions matching a filter, sorted by id
    pub fn find(&self, filter: &RegionFilter) -> Vec<&Region> {
        self.iter().filter(|r| filter.matches(r)).collect()
    }

    fn lookup<'a>(
        &'a self,
        index: &'a HashMap<String, Vec<RegionId>>,
        key: &str,
        country_id: Option<&str>,
    ) -> Vec<&'a Region> {
        let Some(ids) = index.get(key) else {
            return Vec::new();
        };
        let country = country_id.map(fold_key);
        ids.iter()
            .filter_map(|id| self.regions.get(id))
            .filter(|r| match &country {
                None => true,
                Some(c) => r.country_id.as_deref().map(fold_key).as_ref() == Some(c),
            })
            .collect()
    }

    /// Regions with the given short code
    ///
    /// Without a country filter only country-level regions (no `country_id`)
    /// are considered.
    pub fn by_short_code(&self, code: &str, country_id: Option<&str>) -> Vec<&Region> {
        self.scoped(self.lookup(&self.by_short_code, code, country_id), country_id)
    }

    /// Regions with the given long code
    pub fn by_long_code(&self, code: &str, country_id: Option<&str>) -> Vec<&Region> {
        self.scoped(self.lookup(&self.by_long_code, code, country_id), country_id)
    }

    /// Regions with the given numeric code
    pub fn by_numeric_code(&self, code: &str, country_id: Option<&str>) -> Vec<&Region> {
        self.scoped(self.lookup(&self.by_numeric_code, code, country_id), country_id)
    }

    /// Regions whose name equals `name` (case-insensitive)
    pub fn by_name(&self, name: &str, country_id: Option<&str>) -> Vec<&Region> {
        self.scoped(self.lookup(&self.by_name, &fold_key(name), country_id), country_id)
    }

    /// Regions whose name contains `fragment` (case-insensitive)
    pub fn search_name(&self, fragment: &str, country_id: Option<&str>) -> Vec<&Region> {
        let needle = fold_key(fragment);
        if needle.is_empty() {
            return Vec::new();
        }
        let candidates: Vec<&Region> = match country_id {
            Some(c) => self.subdivisions(c),
            None => self.iter().filter(|r| r.country_id.is_none()).collect(),
        };
        candidates
            .into_iter()
            .filter(|r| fold_key(&r.name).contains(&needle))
            .collect()
    }

    fn scoped<'a>(&self, regions: Vec<&'a Region>, country_id: Option<&str>) -> Vec<&'a Region> {
        if country_id.is_some() {
            regions
        } else {
            regions.into_iter().filter(|r| r.country_id.is_none()).collect()
        }
    }

    /// Every region whose `country_id` is the given country, sorted by id
    pub fn subdivisions(&self, country_id: &str) -> Vec<&Region> {
        let Some(canonical) = self.canonical_id(country_id) else {
            return Vec::new();
        };
        self.by_country
            .get(canonical)
            .map(|ids| ids.iter().filter_map(|id| self.regions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Primary parent of a region
    pub fn parent(&self, id: &str) -> Result<Option<&Region>> {
        let region = self.get(id)?;
        match &region.parent_id {
            Some(parent) => Ok(Some(self.get(parent)?)),
            None => Ok(None),
        }
    }

    /// Primary children of a region, sorted by id
    pub fn primary_children(&self, id: &str) -> Result<Vec<RegionId>> {
        let region = self.get(id)?;
        Ok(self
            .primary_children
            .get(&region.id)
            .cloned()
            .unwrap_or_default())
    }

    /// Primary ancestors, nearest first, ending at the root
    pub fn ancestors(&self, id: &str) -> Result<Vec<RegionId>> {
        let mut out = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = &current.parent_id {
            if out.len() > self.regions.len() {
                break;
            }
            current = self.get(parent)?;
            out.push(current.id.clone());
        }
        Ok(out)
    }

    /// Children of a region within a relation, sorted by id
    pub fn children(&self, id: &str, relation: &str) -> Result<Vec<RegionId>> {
        let region = self.get(id)?;
        Ok(self
            .relations
            .get(relation)
            .and_then(|r| r.children.get(&region.id))
            .cloned()
            .unwrap_or_default())
    }

    /// Parents of a region within a relation, sorted by id
    ///
    /// More than one parent indicates malformed data.
    pub fn parents(&self, id: &str, relation: &str) -> Result<Vec<RegionId>> {
        let region = self.get(id)?;
        Ok(self.relation_parents(&region.id, relation).to_vec())
    }

    pub(crate) fn relation_parents(&self, id: &str, relation: &str) -> &[RegionId] {
        self.relations
            .get(relation)
            .and_then(|r| r.parents.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn relation_children(&self, id: &str, relation: &str) -> &[RegionId] {
        self.relations
            .get(relation)
            .and_then(|r| r.children.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Cycle through `id` in the relation, if any
    pub(crate) fn cycle_through(&self, id: &str, relation: &str) -> Option<&[RegionId]> {
        let index = self.relations.get(relation)?;
        let component = *index.cycle_of.get(id)?;
        index
            .diagnostics
            .cycles
            .get(component)
            .map(Vec::as_slice)
    }

    /// Every region reachable downward from `id` in the relation
    ///
    /// Breadth-first, nearest first; `id` itself is excluded.
    pub fn descendants(&self, id: &str, relation: &str) -> Result<Vec<RegionId>> {
        let region = self.get(id)?;
        let mut seen: HashSet<&str> = HashSet::from([region.id.as_str()]);
        let mut queue: VecDeque<&str> = VecDeque::from([region.id.as_str()]);
        let mut out = Vec::new();
        while let Some(node) = queue.pop_front() {
            for child in self.relation_children(node, relation) {
                if seen.insert(child.as_str()) {
                    out.push(child.clone());
                    queue.push_back(child.as_str());
                }
            }
        }
        Ok(out)
    }

    /// All edges of a relation, sorted
    pub fn edges(&self, relation: &str) -> &[HierarchyEdge] {
        self.relations
            .get(relation)
            .map(|r| r.edges.as_slice())
            .unwrap_or(&[])
    }

    /// Every edge of every relation
    pub fn all_edges(&self) -> impl Iterator<Item = &HierarchyEdge> {
        self.relations.values().flat_map(|r| r.edges.iter())
    }

    /// Relation labels present in the store, sorted
    pub fn relations(&self) -> Vec<String> {
        self.relations.keys().cloned().collect()
    }

    /// Whether the relation has at least one edge
    pub fn has_relation(&self, relation: &str) -> bool {
        self.relations.contains_key(relation)
    }

    /// Largest level of any region
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Longest child-to-ancestor chain of a relation, in edges
    ///
    /// Nodes on cycles count as tops. Unknown relations have depth 0.
    pub fn relation_depth(&self, relation: &str) -> usize {
        self.relations.get(relation).map_or(0, |r| r.depth)
    }

    /// Per-relation diagnostics, sorted by relation
    pub fn diagnostics(&self) -> Vec<&RelationDiagnostics> {
        self.relations.values().map(|r| &r.diagnostics).collect()
    }

    /// Diagnostics of one relation
    pub fn relation_diagnostics(&self, relation: &str) -> Option<&RelationDiagnostics> {
        self.relations.get(relation).map(|r| &r.diagnostics)
    }
}

/// Nodes lying on cycles of a child -> parent graph (Tarjan, iterative)
pub(super) fn find_cycles(parents: &HashMap<RegionId, Vec<RegionId>>) -> Vec<Vec<RegionId>> {
    let mut nodes: BTreeSet<&str> = BTreeSet::new();
    for (child, ps) in parents {
        nodes.insert(child);
        nodes.extend(ps.iter().map(String::as_str));
    }

    let mut index_of: HashMap<&str, usize> = HashMap::new();
    let mut lowlink: HashMap<&str, usize> = HashMap::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut next_index = 0usize;
    let mut cycles = Vec::new();
    let empty: Vec<RegionId> = Vec::new();

    for &root in &nodes {
        if index_of.contains_key(root) {
            continue;
        }
        // (node, position of the next successor to visit)
        let mut work: Vec<(&str, usize)> = vec![(root, 0)];
        while let Some(&mut (node, ref mut pos)) = work.last_mut() {
            if *pos == 0 && !index_of.contains_key(node) {
                index_of.insert(node, next_index);
                lowlink.insert(node, next_index);
                next_index += 1;
                stack.push(node);
                on_stack.insert(node);
            }
            let successors = parents.get(node).unwrap_or(&empty);
            if let Some(next) = successors.get(*pos) {
                *pos += 1;
                let next = next.as_str();
                if !index_of.contains_key(next) {
                    work.push((next, 0));
                } else if on_stack.contains(next) {
                    let low = lowlink[node].min(index_of[next]);
                    lowlink.insert(node, low);
                }
                continue;
            }

            work.pop();
            if let Some(&(caller, _)) = work.last() {
                let low = lowlink[caller].min(lowlink[node]);
                lowlink.insert(caller, low);
            }
            if lowlink[node] == index_of[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(member);
                    component.push(member.to_string());
                    if member == node {
                        break;
                    }
                }
                let self_loop = successors.iter().any(|p| p == node);
                if component.len() > 1 || self_loop {
                    component.sort();
                    cycles.push(component);
                }
            }
        }
    }

    cycles.sort();
    cycles
}

/// Longest path of a child -> parent graph, ignoring nodes on cycles
pub(super) fn relation_depth(
    parents: &HashMap<RegionId, Vec<RegionId>>,
    cycle_of: &HashMap<RegionId, usize>,
) -> usize {
    let mut height: HashMap<&str, usize> = HashMap::new();
    let mut deepest = 0;

    for start in parents.keys() {
        let mut work: Vec<(&str, bool)> = vec![(start.as_str(), false)];
        while let Some((node, expanded)) = work.pop() {
            if height.contains_key(node) {
                continue;
            }
            let ups = parents.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if cycle_of.contains_key(node) || ups.is_empty() {
                height.insert(node, 0);
                continue;
            }
            if !expanded {
                work.push((node, true));
                for parent in ups {
                    if !height.contains_key(parent.as_str()) {
                        work.push((parent.as_str(), false));
                    }
                }
                continue;
            }
            let h = 1 + ups
                .iter()
                .map(|p| height.get(p.as_str()).copied().unwrap_or(0))
                .max()
                .unwrap_or(0);
            deepest = deepest.max(h);
            height.insert(node, h);
        }
    }
    deepest
}
