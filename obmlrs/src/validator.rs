//! Semantic validator: global uniqueness, join-graph shape, and join wiring.
//!
//! Reference existence (does this dimension's data object exist, does this
//! join target exist) is the `resolver` module's job; this module checks
//! properties of the model *as a whole*: duplicate identifiers, duplicate
//! column names, cyclic or ambiguous join paths, and the secondary-join
//! `pathName` discipline.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::diagnostics::Diagnostic;
use crate::model::SemanticModel;

pub struct SemanticValidator;

impl SemanticValidator {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(skip(self, model))]
    pub fn validate(&self, model: &SemanticModel) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        errors.extend(self.check_unique_identifiers(model));
        errors.extend(self.check_unique_column_names(model));
        errors.extend(self.check_join_wiring(model));
        errors.extend(self.check_secondary_join_path_names(model));
        errors.extend(self.check_no_cyclic_joins(model));
        errors.extend(self.check_no_multipath_joins(model));
        errors
    }

    fn check_unique_identifiers(&self, model: &SemanticModel) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (name, kind) in model.all_identifiers() {
            if let Some(existing) = seen.get(name) {
                errors.push(
                    Diagnostic::new(
                        "DUPLICATE_IDENTIFIER",
                        format!("{kind} '{name}' conflicts with existing {existing} '{name}'"),
                    )
                    .at(format!("{kind}s.{name}")),
                );
            } else {
                seen.insert(name, kind);
            }
        }
        errors
    }

    fn check_unique_column_names(&self, model: &SemanticModel) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        let mut col_locations: HashMap<&str, &str> = HashMap::new();
        for (obj_name, obj) in &model.data_objects {
            for col in &obj.columns {
                if let Some(existing) = col_locations.get(col.name.as_str()) {
                    errors.push(
                        Diagnostic::new(
                            "DUPLICATE_COLUMN_NAME",
                            format!(
                                "Column '{}' in data object '{obj_name}' conflicts with same \
                                 column in '{existing}'. Column names must be globally unique.",
                                col.name
                            ),
                        )
                        .at(format!("dataObjects.{obj_name}.columns.{}", col.name)),
                    );
                } else {
                    col_locations.insert(col.name.as_str(), obj_name.as_str());
                }
            }
        }
        errors
    }

    fn check_join_wiring(&self, model: &SemanticModel) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        for (obj_name, obj) in &model.data_objects {
            for (i, join) in obj.joins.iter().enumerate() {
                if join.columns_from.len() != join.columns_to.len() {
                    errors.push(
                        Diagnostic::new(
                            "JOIN_COLUMN_COUNT_MISMATCH",
                            format!(
                                "Data object '{obj_name}' join[{i}] has {} columnsFrom and {} columnsTo",
                                join.columns_from.len(),
                                join.columns_to.len()
                            ),
                        )
                        .at(format!("dataObjects.{obj_name}.joins[{i}]")),
                    );
                }
                for col in &join.columns_from {
                    if !obj.has_column(col) {
                        errors.push(
                            Diagnostic::new(
                                "UNKNOWN_JOIN_COLUMN",
                                format!(
                                    "Data object '{obj_name}' join[{i}] columnsFrom references unknown column '{col}'"
                                ),
                            )
                            .at(format!("dataObjects.{obj_name}.joins[{i}].columnsFrom")),
                        );
                    }
                }
                if let Some(target) = model.data_objects.get(&join.join_to) {
                    for col in &join.columns_to {
                        if !target.has_column(col) {
                            errors.push(
                                Diagnostic::new(
                                    "UNKNOWN_JOIN_COLUMN",
                                    format!(
                                        "Data object '{obj_name}' join[{i}] columnsTo references \
                                         unknown column '{col}' in data object '{}'",
                                        join.join_to
                                    ),
                                )
                                .at(format!("dataObjects.{obj_name}.joins[{i}].columnsTo")),
                            );
                        }
                    }
                }
            }
        }
        errors
    }

    /// Secondary joins are explicitly opt-in at query time via `pathName`, so
    /// each one needs a name, and that name must be unique among the
    /// secondary joins sharing the same (source, target) pair -- otherwise a
    /// query's `usePathNames` selection would be ambiguous.
    fn check_secondary_join_path_names(&self, model: &SemanticModel) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        let mut seen: HashSet<(&str, &str, &str)> = HashSet::new();
        for (obj_name, obj) in &model.data_objects {
            for (i, join) in obj.joins.iter().enumerate() {
                if !join.secondary {
                    continue;
                }
                match &join.path_name {
                    None => errors.push(
                        Diagnostic::new(
                            "SECONDARY_JOIN_MISSING_PATH_NAME",
                            format!(
                                "Data object '{obj_name}' join[{i}] to '{}' is secondary and \
                                 must declare a pathName",
                                join.join_to
                            ),
                        )
                        .at(format!("dataObjects.{obj_name}.joins[{i}]")),
                    ),
                    Some(path_name) => {
                        let key = (obj_name.as_str(), join.join_to.as_str(), path_name.as_str());
                        if !seen.insert(key) {
                            errors.push(
                                Diagnostic::new(
                                    "DUPLICATE_JOIN_PATH_NAME",
                                    format!(
                                        "Data object '{obj_name}' has more than one secondary join \
                                         to '{}' named '{path_name}'",
                                        join.join_to
                                    ),
                                )
                                .at(format!("dataObjects.{obj_name}.joins[{i}]")),
                            );
                        }
                    }
                }
            }
        }
        errors
    }

    /// DFS cycle detection over the *primary* join graph only -- secondary
    /// joins are excluded because they're selected per-query and can never
    /// create a model-level ambiguity.
    fn check_no_cyclic_joins(&self, model: &SemanticModel) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        let adj = primary_adjacency(model);

        let mut visited: HashSet<&str> = HashSet::new();
        let mut rec_stack: HashSet<&str> = HashSet::new();

        fn dfs<'a>(
            node: &'a str,
            adj: &HashMap<&'a str, Vec<&'a str>>,
            visited: &mut HashSet<&'a str>,
            rec_stack: &mut HashSet<&'a str>,
            path: &mut Vec<&'a str>,
            errors: &mut Vec<Diagnostic>,
        ) {
            visited.insert(node);
            rec_stack.insert(node);
            path.push(node);
            if let Some(neighbors) = adj.get(node) {
                for &neighbor in neighbors {
                    if !visited.contains(neighbor) {
                        dfs(neighbor, adj, visited, rec_stack, path, errors);
                    } else if rec_stack.contains(neighbor) {
                        let cycle: Vec<&str> = if let Some(pos) = path.iter().position(|&n| n == neighbor) {
                            path[pos..].iter().chain(std::iter::once(&neighbor)).copied().collect()
                        } else {
                            vec![node, neighbor]
                        };
                        errors.push(
                            Diagnostic::new(
                                "CYCLIC_JOIN",
                                format!("Cyclic join detected: {}", cycle.join(" -> ")),
                            )
                            .at(format!("dataObjects.{node}.joins")),
                        );
                    }
                }
            }
            path.pop();
            rec_stack.remove(node);
        }

        let nodes: Vec<&str> = adj.keys().copied().collect();
        for node in nodes {
            if !visited.contains(node) {
                dfs(node, &adj, &mut visited, &mut rec_stack, &mut Vec::new(), &mut errors);
            }
        }
        errors
    }

    /// BFS-per-start-node diamond detection: flags a pair `(start, node)`
    /// reachable from `start` via two distinct intermediate parents, unless
    /// `node` is also a direct neighbor of `start` (a direct edge is the
    /// canonical path and an indirect alternative to it isn't ambiguous).
    fn check_no_multipath_joins(&self, model: &SemanticModel) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        let adj = primary_adjacency(model);
        let mut reported: HashSet<(&str, &str)> = HashSet::new();

        for (&start, neighbors) in &adj {
            if neighbors.is_empty() {
                continue;
            }
            let direct: HashSet<&str> = neighbors.iter().copied().filter(|&n| n != start).collect();
            let mut first_parent: HashMap<&str, &str> = HashMap::new();
            let mut queue: VecDeque<(&str, &str)> = VecDeque::new();
            for &n in &direct {
                first_parent.entry(n).or_insert_with(|| {
                    queue.push_back((n, start));
                    start
                });
            }

            while let Some((node, _parent)) = queue.pop_front() {
                if let Some(next) = adj.get(node) {
                    for &neighbor in next {
                        if neighbor == start {
                            continue;
                        }
                        match first_parent.get(neighbor) {
                            None => {
                                first_parent.insert(neighbor, node);
                                queue.push_back((neighbor, node));
                            }
                            Some(&existing_parent) if existing_parent != node => {
                                if direct.contains(neighbor) {
                                    continue;
                                }
                                let pair = (start, neighbor);
                                if reported.insert(pair) {
                                    errors.push(
                                        Diagnostic::new(
                                            "MULTIPATH_JOIN",
                                            format!(
                                                "Multiple join paths from '{start}' to '{neighbor}' \
                                                 (via '{existing_parent}' and '{node}'). Join paths \
                                                 must be unambiguous."
                                            ),
                                        )
                                        .at(format!("dataObjects.{start}.joins")),
                                    );
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        errors
    }
}

impl Default for SemanticValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn primary_adjacency(model: &SemanticModel) -> HashMap<&str, Vec<&str>> {
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    for (obj_name, obj) in &model.data_objects {
        let entry = adj.entry(obj_name.as_str()).or_default();
        for join in &obj.joins {
            if join.secondary {
                continue;
            }
            entry.push(join.join_to.as_str());
        }
    }
    adj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cardinality, DataObject, DataObjectColumn, DataObjectJoin, DataType, JoinType};
    use std::collections::BTreeMap;

    fn obj(name: &str, joins: Vec<DataObjectJoin>) -> DataObject {
        DataObject {
            database: None,
            schema: None,
            code: name.to_lowercase(),
            columns: vec![DataObjectColumn {
                name: format!("{}_id", name.to_lowercase()),
                data_type: DataType::Integer,
                description: None,
            }],
            joins,
        }
    }

    fn join(to: &str, secondary: bool, path_name: Option<&str>) -> DataObjectJoin {
        DataObjectJoin {
            join_type: JoinType::Left,
            join_to: to.to_string(),
            cardinality: Cardinality::ManyToOne,
            columns_from: vec![],
            columns_to: vec![],
            secondary,
            path_name: path_name.map(str::to_string),
        }
    }

    #[test]
    fn detects_cycle_in_primary_graph() {
        let mut data_objects = BTreeMap::new();
        data_objects.insert("A".to_string(), obj("A", vec![join("B", false, None)]));
        data_objects.insert("B".to_string(), obj("B", vec![join("A", false, None)]));
        let model = SemanticModel {
            data_objects,
            ..Default::default()
        };
        let errors = SemanticValidator::new().check_no_cyclic_joins(&model);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "CYCLIC_JOIN");
    }

    #[test]
    fn secondary_join_excluded_from_cycle_check() {
        let mut data_objects = BTreeMap::new();
        data_objects.insert("A".to_string(), obj("A", vec![join("B", false, None)]));
        data_objects.insert(
            "B".to_string(),
            obj("B", vec![join("A", true, Some("alt"))]),
        );
        let model = SemanticModel {
            data_objects,
            ..Default::default()
        };
        let errors = SemanticValidator::new().check_no_cyclic_joins(&model);
        assert!(errors.is_empty());
    }

    #[test]
    fn direct_edge_exempts_diamond() {
        let mut data_objects = BTreeMap::new();
        data_objects.insert(
            "Purchases".to_string(),
            obj(
                "Purchases",
                vec![join("Products", false, None), join("Suppliers", false, None)],
            ),
        );
        data_objects.insert(
            "Products".to_string(),
            obj("Products", vec![join("Suppliers", false, None)]),
        );
        data_objects.insert("Suppliers".to_string(), obj("Suppliers", vec![]));
        let model = SemanticModel {
            data_objects,
            ..Default::default()
        };
        let errors = SemanticValidator::new().check_no_multipath_joins(&model);
        assert!(errors.is_empty());
    }

    #[test]
    fn true_diamond_is_flagged() {
        let mut data_objects = BTreeMap::new();
        data_objects.insert(
            "Start".to_string(),
            obj("Start", vec![join("Left", false, None), join("Right", false, None)]),
        );
        data_objects.insert("Left".to_string(), obj("Left", vec![join("End", false, None)]));
        data_objects.insert("Right".to_string(), obj("Right", vec![join("End", false, None)]));
        data_objects.insert("End".to_string(), obj("End", vec![]));
        let model = SemanticModel {
            data_objects,
            ..Default::default()
        };
        let errors = SemanticValidator::new().check_no_multipath_joins(&model);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "MULTIPATH_JOIN");
    }

    #[test]
    fn secondary_join_requires_path_name() {
        let mut data_objects = BTreeMap::new();
        data_objects.insert("A".to_string(), obj("A", vec![join("B", true, None)]));
        data_objects.insert("B".to_string(), obj("B", vec![]));
        let model = SemanticModel {
            data_objects,
            ..Default::default()
        };
        let errors = SemanticValidator::new().check_secondary_join_path_names(&model);
        assert_eq!(errors[0].code, "SECONDARY_JOIN_MISSING_PATH_NAME");
    }

    #[test]
    fn duplicate_secondary_path_names_flagged() {
        let mut data_objects = BTreeMap::new();
        data_objects.insert(
            "A".to_string(),
            obj(
                "A",
                vec![join("B", true, Some("alt")), join("B", true, Some("alt"))],
            ),
        );
        data_objects.insert("B".to_string(), obj("B", vec![]));
        let model = SemanticModel {
            data_objects,
            ..Default::default()
        };
        let errors = SemanticValidator::new().check_secondary_join_path_names(&model);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "DUPLICATE_JOIN_PATH_NAME");
    }
}
