use std::borrow::Cow;

use graphormer_autodiff::Parameter;
use graphormer_core::{DType, Tensor};
use graphormer_graph::HeteroGraph;
use rand::Rng;
use tracing::{debug, instrument, trace};

use crate::config::{DegreeEncoderConfig, Direction};
use crate::error::NnResult;
use crate::layers::Embedding;
use crate::modules::Module;

#[derive(Debug, Clone)]
enum DegreeTables {
    In(Embedding),
    Out(Embedding),
    Both { in_table: Embedding, out_table: Embedding },
}

/// Degree Encoder, as introduced in
/// "Do Transformers Really Perform Bad for Graph Representation?".
///
/// Maps each node's in-degree and/or out-degree, clamped to `max_degree`, to
/// a learned vector. Degree `0` is the padding slot and always embeds to zero.
///
/// ```ignore
/// let g = HeteroGraph::homogeneous(4, &[0, 0, 0, 1, 1, 2, 3, 3], &[1, 2, 3, 0, 3, 0, 0, 1])?;
/// let encoder = DegreeEncoder::new(5, 16, Direction::Both, DType::Float32, &mut rng)?;
/// let embedding = encoder.forward(&g)?; // [4, 16]
/// ```
#[derive(Debug, Clone)]
pub struct DegreeEncoder {
    pub max_degree: usize,
    pub embedding_dim: usize,
    tables: DegreeTables,
}

impl DegreeEncoder {
    pub fn new<R: Rng + ?Sized>(
        max_degree: usize,
        embedding_dim: usize,
        direction: Direction,
        dtype: DType,
        rng: &mut R,
    ) -> NnResult<Self> {
        let config = DegreeEncoderConfig::new(max_degree, embedding_dim)
            .with_direction(direction)
            .with_dtype(dtype);
        Self::from_config(&config, rng)
    }

    pub fn from_config<R: Rng + ?Sized>(
        config: &DegreeEncoderConfig,
        rng: &mut R,
    ) -> NnResult<Self> {
        config.validate()?;
        let rows = config.max_degree + 1;
        let table = |rng: &mut R| {
            Embedding::new(rows, config.embedding_dim, Some(0), config.dtype, rng)
        };

        let tables = match config.direction {
            Direction::In => DegreeTables::In(table(rng)?),
            Direction::Out => DegreeTables::Out(table(rng)?),
            Direction::Both => DegreeTables::Both {
                in_table: table(rng)?,
                out_table: table(rng)?,
            },
        };

        debug!(
            max_degree = config.max_degree,
            embedding_dim = config.embedding_dim,
            direction = %config.direction,
            "built degree encoder"
        );

        Ok(DegreeEncoder {
            max_degree: config.max_degree,
            embedding_dim: config.embedding_dim,
            tables,
        })
    }

    pub fn direction(&self) -> Direction {
        match self.tables {
            DegreeTables::In(_) => Direction::In,
            DegreeTables::Out(_) => Direction::Out,
            DegreeTables::Both { .. } => Direction::Both,
        }
    }

    /// In-degree table, absent for `Direction::Out`.
    pub fn in_table(&self) -> Option<&Embedding> {
        match &self.tables {
            DegreeTables::In(t) | DegreeTables::Both { in_table: t, .. } => Some(t),
            DegreeTables::Out(_) => None,
        }
    }

    /// Out-degree table, absent for `Direction::In`.
    pub fn out_table(&self) -> Option<&Embedding> {
        match &self.tables {
            DegreeTables::Out(t) | DegreeTables::Both { out_table: t, .. } => Some(t),
            DegreeTables::In(_) => None,
        }
    }

    /// In- and out-degrees clamped into `[0, max_degree]`, as `Int64` `[N]`.
    ///
    /// Graphs with several node or edge types are merged into one type first.
    pub fn clamped_degrees(&self, graph: &HeteroGraph) -> NnResult<(Tensor, Tensor)> {
        let graph = if graph.num_ntypes() > 1 || graph.num_etypes() > 1 {
            Cow::Owned(graph.to_homogeneous())
        } else {
            Cow::Borrowed(graph)
        };
        let max = self.max_degree as i64;
        let in_degree = graph.in_degrees()?.clamp(0, max)?;
        let out_degree = graph.out_degrees()?.clamp(0, max)?;
        Ok((in_degree, out_degree))
    }

    /// Degree embedding of every node, shape `[N, embedding_dim]`.
    #[instrument(skip_all)]
    pub fn forward(&self, graph: &HeteroGraph) -> NnResult<Tensor> {
        let (in_degree, out_degree) = self.clamped_degrees(graph)?;
        trace!(num_nodes = in_degree.numel(), "looking up degree embeddings");

        let embedding = match &self.tables {
            DegreeTables::In(table) => table.forward(&in_degree)?,
            DegreeTables::Out(table) => table.forward(&out_degree)?,
            DegreeTables::Both { in_table, out_table } => {
                (&in_table.forward(&in_degree)? + &out_table.forward(&out_degree)?)?
            }
        };
        Ok(embedding)
    }

    /// Accumulate `grad_output` (`[N, embedding_dim]`) into the table
    /// gradients. The padding row never receives gradient.
    pub fn backward(&mut self, graph: &HeteroGraph, grad_output: &Tensor) -> NnResult<()> {
        let (in_degree, out_degree) = self.clamped_degrees(graph)?;
        match &mut self.tables {
            DegreeTables::In(table) => table.backward(&in_degree, grad_output)?,
            DegreeTables::Out(table) => table.backward(&out_degree, grad_output)?,
            DegreeTables::Both { in_table, out_table } => {
                in_table.backward(&in_degree, grad_output)?;
                out_table.backward(&out_degree, grad_output)?;
            }
        }
        Ok(())
    }
}

impl Module for DegreeEncoder {
    fn parameters(&self) -> Vec<&Parameter> {
        match &self.tables {
            DegreeTables::In(t) | DegreeTables::Out(t) => t.parameters(),
            DegreeTables::Both { in_table, out_table } => {
                let mut params = in_table.parameters();
                params.extend(out_table.parameters());
                params
            }
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        match &mut self.tables {
            DegreeTables::In(t) | DegreeTables::Out(t) => t.parameters_mut(),
            DegreeTables::Both { in_table, out_table } => {
                let mut params = in_table.parameters_mut();
                params.extend(out_table.parameters_mut());
                params
            }
        }
    }
}
