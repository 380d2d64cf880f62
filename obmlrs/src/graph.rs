//! Join graph: finds the shortest join path from a base object to every
//! object a query's dimensions/measures actually live on.
//!
//! The graph is undirected for path-finding purposes (a join can be walked
//! in either direction once it's known to be acyclic and unambiguous -- that
//! shape is the validator's job) but each traversed edge remembers whether it
//! was walked forward (matching its declared `from -> to` direction) or
//! backward, because the fanout detector needs to know which side of the
//! join gets multiplied.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ast::{BinOp, Expr, JoinKind};
use crate::error::{ObmlError, Result};
use crate::model::{Cardinality, JoinType, SemanticModel};

#[derive(Debug, Clone, PartialEq)]
pub struct JoinStep {
    pub from_object: String,
    pub to_object: String,
    pub join_type: JoinType,
    pub cardinality: Cardinality,
    pub columns_from: Vec<String>,
    pub columns_to: Vec<String>,
    /// True when this step's declared join direction runs the opposite way
    /// from how the traversal walked it (i.e. we joined from `join_to` back
    /// to the object that declared the join).
    pub reversed: bool,
    pub secondary: bool,
    pub path_name: Option<String>,
}

impl JoinStep {
    pub fn as_ast_join_kind(&self) -> JoinKind {
        match self.join_type {
            JoinType::Inner => JoinKind::Inner,
            JoinType::Left => JoinKind::Left,
            JoinType::Right => JoinKind::Right,
            JoinType::Full => JoinKind::Full,
        }
    }
}

struct Edge {
    declared_from: String,
    declared_to: String,
    join_type: JoinType,
    cardinality: Cardinality,
    columns_from: Vec<String>,
    columns_to: Vec<String>,
    secondary: bool,
    path_name: Option<String>,
}

pub struct JoinGraph<'m> {
    model: &'m SemanticModel,
    /// Undirected adjacency: object -> list of (neighbor, edge index).
    adjacency: HashMap<String, Vec<(String, usize)>>,
    edges: Vec<Edge>,
}

/// A query's `usePathNames(source, target, pathName)` selector for a
/// secondary join. Keyed on all three fields so that two different object
/// pairs can reuse the same `pathName` without colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathNameKey {
    pub source: String,
    pub target: String,
    pub path_name: String,
}

impl<'m> JoinGraph<'m> {
    pub fn build(model: &'m SemanticModel, use_path_names: &HashSet<PathNameKey>) -> Self {
        let mut adjacency: HashMap<String, Vec<(String, usize)>> = HashMap::new();
        let mut edges = Vec::new();
        for (obj_name, obj) in &model.data_objects {
            for join in &obj.joins {
                if join.secondary {
                    let requested = join.path_name.as_ref().is_some_and(|p| {
                        use_path_names.contains(&PathNameKey {
                            source: obj_name.clone(),
                            target: join.join_to.clone(),
                            path_name: p.clone(),
                        })
                    });
                    if !requested {
                        continue;
                    }
                }
                let idx = edges.len();
                edges.push(Edge {
                    declared_from: obj_name.clone(),
                    declared_to: join.join_to.clone(),
                    join_type: join.join_type,
                    cardinality: join.cardinality,
                    columns_from: join.columns_from.clone(),
                    columns_to: join.columns_to.clone(),
                    secondary: join.secondary,
                    path_name: join.path_name.clone(),
                });
                adjacency
                    .entry(obj_name.clone())
                    .or_default()
                    .push((join.join_to.clone(), idx));
                adjacency
                    .entry(join.join_to.clone())
                    .or_default()
                    .push((obj_name.clone(), idx));
            }
        }
        Self {
            model,
            adjacency,
            edges,
        }
    }

    /// Shortest-path-per-target join path from `base` to every object in
    /// `targets` (deduplicated against `base` and already-reached objects).
    /// Targets are folded into the reachable set as they're found, so a
    /// later target reachable only through an earlier one doesn't repeat
    /// shared edges.
    pub fn find_join_path(&self, base: &str, targets: &[String]) -> Result<Vec<JoinStep>> {
        let mut steps = Vec::new();
        let mut visited_edges: HashSet<usize> = HashSet::new();
        let mut reached: HashSet<String> = HashSet::from([base.to_string()]);

        for target in targets {
            if reached.contains(target) {
                continue;
            }
            let path_edges = self.bfs_path(&reached, target)?;
            for (from_node, to_node, edge_idx) in path_edges {
                if visited_edges.insert(edge_idx) {
                    steps.push(self.edge_to_step(edge_idx, &from_node, &to_node));
                }
                reached.insert(to_node);
            }
        }
        Ok(steps)
    }

    /// BFS from any node in `sources` to `target`, returning the edge chain
    /// as `(from, to, edge_index)` triples in traversal order.
    fn bfs_path(
        &self,
        sources: &HashSet<String>,
        target: &str,
    ) -> Result<Vec<(String, String, usize)>> {
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut came_from: HashMap<String, (String, usize)> = HashMap::new();
        let mut visited: HashSet<String> = sources.clone();
        for s in sources {
            queue.push_back(s.clone());
        }

        while let Some(node) = queue.pop_front() {
            if node == target {
                let mut chain = Vec::new();
                let mut cur = node.clone();
                while let Some((prev, edge_idx)) = came_from.get(&cur) {
                    chain.push((prev.clone(), cur.clone(), *edge_idx));
                    cur = prev.clone();
                }
                chain.reverse();
                return Ok(chain);
            }
            if let Some(neighbors) = self.adjacency.get(&node) {
                for (neighbor, edge_idx) in neighbors {
                    if visited.insert(neighbor.clone()) {
                        came_from.insert(neighbor.clone(), (node.clone(), *edge_idx));
                        queue.push_back(neighbor.clone());
                    }
                }
            }
        }

        Err(ObmlError::Planning(format!(
            "no join path found to data object '{target}'"
        )))
    }

    fn edge_to_step(&self, edge_idx: usize, from_node: &str, to_node: &str) -> JoinStep {
        let edge = &self.edges[edge_idx];
        let reversed = edge.declared_from != from_node;
        let (columns_from, columns_to) = if reversed {
            (edge.columns_to.clone(), edge.columns_from.clone())
        } else {
            (edge.columns_from.clone(), edge.columns_to.clone())
        };
        JoinStep {
            from_object: from_node.to_string(),
            to_object: to_node.to_string(),
            join_type: edge.join_type,
            cardinality: edge.cardinality,
            columns_from,
            columns_to,
            reversed,
            secondary: edge.secondary,
            path_name: edge.path_name.clone(),
        }
    }

    /// AND-chain of column-equality conditions for a join step, using the
    /// target data objects' physical codes as table qualifiers.
    pub fn build_join_condition(&self, step: &JoinStep) -> Result<Expr> {
        if !self.model.data_objects.contains_key(&step.from_object) {
            return Err(ObmlError::Planning(format!(
                "unknown data object '{}'",
                step.from_object
            )));
        }
        if !self.model.data_objects.contains_key(&step.to_object) {
            return Err(ObmlError::Planning(format!(
                "unknown data object '{}'",
                step.to_object
            )));
        }
        // Qualify with the data objects' own map-key labels, not their
        // (now removed) `name` field -- this is the same label the star/CFL
        // planners use as the `AS "<label>"` table alias.
        let mut conditions = Vec::new();
        for (from_col, to_col) in step.columns_from.iter().zip(step.columns_to.iter()) {
            conditions.push(Expr::BinaryOp {
                op: BinOp::Eq,
                left: Box::new(Expr::qualified_col(step.from_object.clone(), from_col.clone())),
                right: Box::new(Expr::qualified_col(step.to_object.clone(), to_col.clone())),
            });
        }
        conditions
            .into_iter()
            .reduce(|l, r| Expr::BinaryOp {
                op: BinOp::And,
                left: Box::new(l),
                right: Box::new(r),
            })
            .ok_or_else(|| ObmlError::Planning("join has no columns".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataObject, DataObjectColumn, DataObjectJoin, DataType};
    use std::collections::BTreeMap;

    fn make_model() -> SemanticModel {
        let mut data_objects = BTreeMap::new();
        data_objects.insert(
            "Orders".to_string(),
            DataObject {
                database: None,
                schema: Some("public".to_string()),
                code: "orders".to_string(),
                columns: vec![
                    DataObjectColumn { name: "order_id".into(), data_type: DataType::Integer, description: None },
                    DataObjectColumn { name: "customer_id".into(), data_type: DataType::Integer, description: None },
                ],
                joins: vec![DataObjectJoin {
                    join_type: JoinType::Left,
                    join_to: "Customers".to_string(),
                    cardinality: Cardinality::ManyToOne,
                    columns_from: vec!["customer_id".to_string()],
                    columns_to: vec!["customer_id".to_string()],
                    secondary: false,
                    path_name: None,
                }],
            },
        );
        data_objects.insert(
            "Customers".to_string(),
            DataObject {
                database: None,
                schema: Some("public".to_string()),
                code: "customers".to_string(),
                columns: vec![DataObjectColumn { name: "customer_id".into(), data_type: DataType::Integer, description: None }],
                joins: vec![],
            },
        );
        SemanticModel {
            data_objects,
            ..Default::default()
        }
    }

    #[test]
    fn finds_direct_path() {
        let model = make_model();
        let graph = JoinGraph::build(&model, &HashSet::<PathNameKey>::new());
        let steps = graph.find_join_path("Orders", &["Customers".to_string()]).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].from_object, "Orders");
        assert_eq!(steps[0].to_object, "Customers");
        assert!(!steps[0].reversed);
    }

    #[test]
    fn marks_reversed_when_traversed_backward() {
        let model = make_model();
        let graph = JoinGraph::build(&model, &HashSet::<PathNameKey>::new());
        let steps = graph.find_join_path("Customers", &["Orders".to_string()]).unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].reversed);
        assert_eq!(steps[0].from_object, "Customers");
        assert_eq!(steps[0].to_object, "Orders");
    }

    #[test]
    fn secondary_join_excluded_unless_requested() {
        let mut model = make_model();
        model
            .data_objects
            .get_mut("Orders")
            .unwrap()
            .joins
            .push(DataObjectJoin {
                join_type: JoinType::Left,
                join_to: "Returns".to_string(),
                cardinality: Cardinality::OneToOne,
                columns_from: vec!["order_id".to_string()],
                columns_to: vec!["order_id".to_string()],
                secondary: true,
                path_name: Some("via_returns".to_string()),
            });
        model.data_objects.insert(
            "Returns".to_string(),
            DataObject {
                database: None,
                schema: None,
                code: "returns".to_string(),
                columns: vec![DataObjectColumn { name: "order_id".into(), data_type: DataType::Integer, description: None }],
                joins: vec![],
            },
        );

        let graph = JoinGraph::build(&model, &HashSet::<PathNameKey>::new());
        assert!(graph.find_join_path("Orders", &["Returns".to_string()]).is_err());

        let mut requested = HashSet::new();
        requested.insert(PathNameKey {
            source: "Orders".to_string(),
            target: "Returns".to_string(),
            path_name: "via_returns".to_string(),
        });
        let graph = JoinGraph::build(&model, &requested);
        let steps = graph.find_join_path("Orders", &["Returns".to_string()]).unwrap();
        assert_eq!(steps.len(), 1);
    }
}
