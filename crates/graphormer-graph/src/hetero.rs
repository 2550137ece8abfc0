use graphormer_core::Tensor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coo::Coo;
use crate::error::{GraphError, GraphResult};

/// Node type name used by homogeneous graphs.
pub const DEFAULT_NTYPE: &str = "_N";
/// Edge type name used by homogeneous graphs.
pub const DEFAULT_ETYPE: &str = "_E";

/// Canonical edge type: `(source node type, edge type, destination node type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub src_type: String,
    pub edge_type: String,
    pub dst_type: String,
}

impl Relation {
    pub fn new(src_type: &str, edge_type: &str, dst_type: &str) -> Self {
        Relation {
            src_type: src_type.to_string(),
            edge_type: edge_type.to_string(),
            dst_type: dst_type.to_string(),
        }
    }

    fn homogeneous() -> Self {
        Relation::new(DEFAULT_NTYPE, DEFAULT_ETYPE, DEFAULT_NTYPE)
    }
}

/// A directed graph whose nodes are partitioned into node types and whose
/// edges are partitioned into relations, each stored as COO.
///
/// Node ids are local to their node type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeteroGraph {
    node_types: Vec<(String, usize)>,
    relations: Vec<(Relation, Coo)>,
}

impl HeteroGraph {
    /// Create a graph with the given node types (in order) and no edges.
    pub fn new(node_types: &[(&str, usize)]) -> GraphResult<Self> {
        let mut graph = HeteroGraph::default();
        for &(name, count) in node_types {
            if graph.ntype_index(name).is_some() {
                return Err(GraphError::DuplicateNodeType(name.to_string()));
            }
            graph.node_types.push((name.to_string(), count));
        }
        Ok(graph)
    }

    /// Create a single-type graph from parallel source/destination arrays.
    pub fn homogeneous(num_nodes: usize, src: &[usize], dst: &[usize]) -> GraphResult<Self> {
        let mut graph = HeteroGraph::new(&[(DEFAULT_NTYPE, num_nodes)])?;
        graph.relations.push((Relation::homogeneous(), Coo::new(num_nodes, num_nodes)));
        graph.add_edges(&Relation::homogeneous(), src, dst)?;
        Ok(graph)
    }

    /// Add edges of `relation`, registering the relation on first use.
    pub fn add_edges(
        &mut self,
        relation: &Relation,
        src: &[usize],
        dst: &[usize],
    ) -> GraphResult<()> {
        if src.len() != dst.len() {
            return Err(GraphError::EndpointLengthMismatch { src: src.len(), dst: dst.len() });
        }
        let num_src = self.check_ids(&relation.src_type, src)?;
        let num_dst = self.check_ids(&relation.dst_type, dst)?;

        let coo = match self.relations.iter().position(|(r, _)| r == relation) {
            Some(i) => &mut self.relations[i].1,
            None => {
                self.relations.push((relation.clone(), Coo::new(num_src, num_dst)));
                let last = self.relations.len() - 1;
                &mut self.relations[last].1
            }
        };
        coo.row.extend_from_slice(src);
        coo.col.extend_from_slice(dst);
        Ok(())
    }

    pub fn num_ntypes(&self) -> usize {
        self.node_types.len()
    }

    pub fn num_etypes(&self) -> usize {
        self.relations.len()
    }

    /// Total number of nodes across all node types.
    pub fn num_nodes(&self) -> usize {
        self.node_types.iter().map(|(_, count)| count).sum()
    }

    /// Total number of edges across all relations.
    pub fn num_edges(&self) -> usize {
        self.relations.iter().map(|(_, coo)| coo.nnz()).sum()
    }

    /// `true` when there is at most one node type and one edge type.
    pub fn is_homogeneous(&self) -> bool {
        self.num_ntypes() <= 1 && self.num_etypes() <= 1
    }

    /// Merge all node and edge types into one.
    ///
    /// Nodes are renumbered by concatenating node types in declaration order;
    /// edges are concatenated in relation order. Structure is preserved.
    pub fn to_homogeneous(&self) -> HeteroGraph {
        let mut offsets = Vec::with_capacity(self.node_types.len());
        let mut total = 0usize;
        for (_, count) in &self.node_types {
            offsets.push(total);
            total += count;
        }

        let mut merged = Coo::new(total, total);
        for (relation, coo) in &self.relations {
            let src_offset = self.ntype_index(&relation.src_type).map_or(0, |i| offsets[i]);
            let dst_offset = self.ntype_index(&relation.dst_type).map_or(0, |i| offsets[i]);
            merged.extend_shifted(coo, src_offset, dst_offset);
        }

        debug!(
            ntypes = self.num_ntypes(),
            etypes = self.num_etypes(),
            num_nodes = total,
            num_edges = merged.nnz(),
            "collapsed graph to a homogeneous type"
        );

        HeteroGraph {
            node_types: vec![(DEFAULT_NTYPE.to_string(), total)],
            relations: vec![(Relation::homogeneous(), merged)],
        }
    }

    /// Number of incoming edges per node as an `Int64` tensor of shape `[N]`.
    pub fn in_degrees(&self) -> GraphResult<Tensor> {
        self.degrees(Coo::col_counts)
    }

    /// Number of outgoing edges per node as an `Int64` tensor of shape `[N]`.
    pub fn out_degrees(&self) -> GraphResult<Tensor> {
        self.degrees(Coo::row_counts)
    }

    fn degrees(&self, counts: fn(&Coo) -> Vec<usize>) -> GraphResult<Tensor> {
        if !self.is_homogeneous() {
            return Err(GraphError::NotHomogeneous {
                ntypes: self.num_ntypes(),
                etypes: self.num_etypes(),
            });
        }
        let n = self.num_nodes();
        let degrees: Vec<i64> = match self.relations.first() {
            Some((_, coo)) => counts(coo).into_iter().map(|d| d as i64).collect(),
            None => vec![0; n],
        };
        Ok(Tensor::from_vec(degrees, &[n])?)
    }

    fn ntype_index(&self, name: &str) -> Option<usize> {
        self.node_types.iter().position(|(n, _)| n == name)
    }

    /// Validate ids against a node type and return that type's node count.
    fn check_ids(&self, ntype: &str, ids: &[usize]) -> GraphResult<usize> {
        let index = self
            .ntype_index(ntype)
            .ok_or_else(|| GraphError::UnknownNodeType(ntype.to_string()))?;
        let count = self.node_types[index].1;
        if let Some(&id) = ids.iter().find(|&&id| id >= count) {
            return Err(GraphError::NodeOutOfRange { ntype: ntype.to_string(), id, count });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_graph() -> HeteroGraph {
        HeteroGraph::homogeneous(4, &[0, 0, 0, 1, 1, 2, 3, 3], &[1, 2, 3, 0, 3, 0, 0, 1]).unwrap()
    }

    #[test]
    fn test_homogeneous_degrees() {
        let g = example_graph();
        assert_eq!(g.num_nodes(), 4);
        assert_eq!(g.num_edges(), 8);
        assert!(g.is_homogeneous());
        assert_eq!(g.in_degrees().unwrap().to_vec::<i64>().unwrap(), vec![3, 2, 1, 2]);
        assert_eq!(g.out_degrees().unwrap().to_vec::<i64>().unwrap(), vec![3, 2, 1, 2]);
    }

    #[test]
    fn test_isolated_nodes_have_zero_degree() {
        let g = HeteroGraph::homogeneous(3, &[0], &[1]).unwrap();
        assert_eq!(g.in_degrees().unwrap().to_vec::<i64>().unwrap(), vec![0, 1, 0]);
        assert_eq!(g.out_degrees().unwrap().to_vec::<i64>().unwrap(), vec![1, 0, 0]);

        let empty = HeteroGraph::new(&[("user", 2)]).unwrap();
        assert_eq!(empty.in_degrees().unwrap().to_vec::<i64>().unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_rejects_bad_edges() {
        assert!(matches!(
            HeteroGraph::homogeneous(2, &[0, 1], &[1]),
            Err(GraphError::EndpointLengthMismatch { .. })
        ));
        assert!(matches!(
            HeteroGraph::homogeneous(2, &[0], &[2]),
            Err(GraphError::NodeOutOfRange { id: 2, count: 2, .. })
        ));
        let mut g = HeteroGraph::new(&[("user", 2)]).unwrap();
        let rel = Relation::new("user", "buys", "item");
        assert_eq!(
            g.add_edges(&rel, &[0], &[0]),
            Err(GraphError::UnknownNodeType("item".into()))
        );
        assert!(HeteroGraph::new(&[("a", 1), ("a", 2)]).is_err());
    }

    #[test]
    fn test_degree_query_requires_single_type() {
        let mut g = HeteroGraph::new(&[("user", 2), ("item", 3)]).unwrap();
        g.add_edges(&Relation::new("user", "buys", "item"), &[0, 1], &[2, 2]).unwrap();
        assert_eq!(
            g.in_degrees().unwrap_err(),
            GraphError::NotHomogeneous { ntypes: 2, etypes: 1 }
        );
    }

    #[test]
    fn test_to_homogeneous_offsets_node_ids() {
        let mut g = HeteroGraph::new(&[("user", 2), ("item", 3)]).unwrap();
        g.add_edges(&Relation::new("user", "buys", "item"), &[0, 1, 1], &[0, 2, 2]).unwrap();
        g.add_edges(&Relation::new("item", "bought-by", "user"), &[2], &[0]).unwrap();
        g.add_edges(&Relation::new("user", "follows", "user"), &[0], &[1]).unwrap();
        assert_eq!(g.num_etypes(), 3);

        let h = g.to_homogeneous();
        assert!(h.is_homogeneous());
        assert_eq!(h.num_nodes(), 5);
        assert_eq!(h.num_edges(), 5);
        // users are 0..2, items are 2..5
        assert_eq!(h.in_degrees().unwrap().to_vec::<i64>().unwrap(), vec![1, 1, 1, 0, 2]);
        assert_eq!(h.out_degrees().unwrap().to_vec::<i64>().unwrap(), vec![2, 2, 0, 0, 1]);
    }

    #[test]
    fn test_add_edges_appends_to_existing_relation() {
        let mut g = example_graph();
        g.add_edges(&Relation::homogeneous(), &[2], &[2]).unwrap();
        assert_eq!(g.num_etypes(), 1);
        assert_eq!(g.num_edges(), 9);
        assert_eq!(g.in_degrees().unwrap().to_vec::<i64>().unwrap(), vec![3, 2, 2, 2]);
    }
}
